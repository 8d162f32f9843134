use async_trait::async_trait;
use mockall::mock;

use multichain_indexer::services::blockwatcher::JobSchedulerTrait;

mock! {
	pub JobScheduler {}

	#[async_trait]
	impl JobSchedulerTrait for JobScheduler {
		async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>>;

		async fn add(&self, job: tokio_cron_scheduler::Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

		async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

		async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	}
}
