//! Block processor.
//!
//! Runs one module over one block and delivers the result to a sink. Output is checked
//! before anything is emitted, so a failed block leaves the sink as it was.

use std::collections::HashMap;
use tracing::instrument;

use crate::{
	models::{BlockContext, BlockId, BlockOutput, Event, ModuleDescriptor},
	services::{
		currency::KnownCurrencies,
		indexer::{IndexerError, IndexerModule},
		ordering::{check_sort_keys, check_zero_sum},
		sink::Sink,
	},
};

/// Verifies, normalizes, validates and emits one block
#[instrument(skip(module, sink), fields(module = %module.descriptor().name))]
pub async fn process_block<S: Sink>(
	module: &dyn IndexerModule,
	sink: &S,
	block_id: BlockId,
) -> Result<BlockOutput, IndexerError> {
	let descriptor = module.descriptor();
	let context = module.ensure_block(block_id).await?;
	let output = module
		.process_block(&context, sink as &dyn KnownCurrencies)
		.await?;

	validate_output(descriptor, &context, &output)?;

	sink.emit_events(&descriptor.name, block_id, &output.events)
		.await?;
	if descriptor.currency_format.is_some() {
		if let Some(currencies) = output.currencies.as_ref().filter(|c| !c.is_empty()) {
			sink.emit_currencies(&descriptor.name, currencies).await?;
		}
	}

	tracing::info!(
		block = %block_id,
		events = output.events.len(),
		currencies = output.currencies.as_ref().map(Vec::len).unwrap_or_default(),
		"Block processed"
	);
	Ok(output)
}

/// Checks the rules every module output obeys
pub fn validate_output(
	descriptor: &ModuleDescriptor,
	context: &BlockContext,
	output: &BlockOutput,
) -> Result<(), IndexerError> {
	let events = &output.events;

	if events.is_empty() && !descriptor.allow_empty_events && !context.is_empty() {
		return Err(violation(descriptor, "Module produced no events", None));
	}

	check_sort_keys(events, context.block_id.is_mempool())?;

	if !descriptor.ignore_sum_of_all_effects {
		check_zero_sum(events)?;
	}

	for (index, event) in events.iter().enumerate() {
		check_event(descriptor, context, index, event)?;
	}

	if descriptor.currency_format.is_none()
		&& output.currencies.as_ref().is_some_and(|c| !c.is_empty())
	{
		return Err(violation(
			descriptor,
			"Module without a currency dimension returned currencies",
			None,
		));
	}

	Ok(())
}

fn check_event(
	descriptor: &ModuleDescriptor,
	context: &BlockContext,
	index: usize,
	event: &Event,
) -> Result<(), IndexerError> {
	if event.block != context.block_id {
		return Err(violation(
			descriptor,
			"Event belongs to another block",
			Some((index, event.block.to_string())),
		));
	}

	if let Some(extra) = &event.extra {
		if !descriptor.extra_vocabulary.contains(&extra.as_str()) {
			return Err(violation(
				descriptor,
				"Extra value outside the module vocabulary",
				Some((index, extra.clone())),
			));
		}
	}

	if event.extra_indexed.is_some() && !descriptor.extra_indexed {
		return Err(violation(
			descriptor,
			"Module does not declare indexed extras",
			Some((index, event.address.clone())),
		));
	}

	match (descriptor.currency_format, &event.currency) {
		(Some(_), None) => Err(violation(
			descriptor,
			"Event without currency",
			Some((index, event.address.clone())),
		)),
		(None, Some(currency)) => Err(violation(
			descriptor,
			"Currency set on a module without currencies",
			Some((index, currency.clone())),
		)),
		_ => Ok(()),
	}
}

fn violation(
	descriptor: &ModuleDescriptor,
	msg: &str,
	event: Option<(usize, String)>,
) -> IndexerError {
	let mut metadata = HashMap::from([("module".to_string(), descriptor.name.clone())]);
	if let Some((index, value)) = event {
		metadata.insert("event".to_string(), index.to_string());
		metadata.insert("value".to_string(), value);
	}
	IndexerError::integrity_error(msg, None, Some(metadata))
}
