use crate::CliError;
use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{LambdaEvent, service_fn};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use telemetry_ingestor::{IngestSummary, Ingestor};

/// Serves the Lambda runtime API until the process is shut down.
pub async fn serve(ingestor: Ingestor) -> Result<(), CliError> {
    tracing::info!(batch_size = ingestor.batch_size(), "Starting Lambda runtime");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| {
        let ingestor = ingestor.clone();
        async move { handle(&ingestor, event).await }
    }))
    .await
    .map_err(|e| CliError::Runtime(e.to_string()))
}

/// Handles one SQS-triggered invocation.
///
/// Batch failures and skipped messages are reported in the summary rather
/// than as an invocation error.
pub async fn handle(
    ingestor: &Ingestor,
    event: LambdaEvent<SqsEvent>,
) -> Result<IngestSummary, lambda_runtime::Error> {
    let (payload, context) = event.into_parts();
    tracing::info!(
        request_id = %context.request_id,
        records = payload.records.len(),
        "Received SQS event"
    );

    Ok(ingestor.ingest_sqs(payload).await)
}

/// Runs one ingestion from a saved SQS event and prints the summary.
pub async fn replay(ingestor: &Ingestor, path: &Path) -> Result<IngestSummary, CliError> {
    let file = File::open(path)?;
    let event: SqsEvent = serde_json::from_reader(BufReader::new(file))?;

    let summary = ingestor.ingest_sqs(event).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(summary)
}
