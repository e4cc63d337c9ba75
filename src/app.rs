use tracing::{info, warn};

use crate::archive;
use crate::config::HostTable;
use crate::domain::{BundleResult, FetchRequest, FetchResult, ItemOutcome, SingleResult};
use crate::error::FetchError;
use crate::remote::{RemoteConnector, RemoteFiles, SessionGuard};
use crate::resolver::FileResolver;
use crate::tail::TailFetcher;

pub const EMPTY_FILE_REASON: &str = "File is empty";

/// Receives a free-text record of every completed request.
/// Implementations swallow their own failures.
pub trait LogSink {
    fn record(&self, message: &str);
}

pub struct NoopSink;

impl LogSink for NoopSink {
    fn record(&self, _message: &str) {}
}

pub struct LogFetcher<C: RemoteConnector> {
    connector: C,
    hosts: HostTable,
    resolver: FileResolver,
    tail: TailFetcher,
}

impl<C: RemoteConnector> LogFetcher<C> {
    pub fn new(connector: C, hosts: HostTable, tail_lines: u32) -> Self {
        Self {
            connector,
            hosts,
            resolver: FileResolver,
            tail: TailFetcher::new(tail_lines),
        }
    }

    pub fn fetch(
        &self,
        request: &FetchRequest,
        sink: &dyn LogSink,
    ) -> Result<FetchResult, FetchError> {
        let result = self.run(request);
        sink.record(&summarize(request, &result));
        result
    }

    fn run(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let profile = self.hosts.get(request.alias())?;
        info!(
            alias = request.alias(),
            directory = request.directory(),
            count = request.identifiers().len(),
            "fetch request"
        );

        let mut session = SessionGuard::new(self.connector.connect(profile)?);
        let files: &mut C::Session = &mut session;

        match request.identifiers() {
            [identifier] => self
                .fetch_single(files, request.directory(), identifier)
                .map(FetchResult::Single),
            identifiers => self
                .fetch_batch(files, request.directory(), identifiers)
                .map(FetchResult::Bundle),
        }
    }

    fn fetch_single<F: RemoteFiles + ?Sized>(
        &self,
        files: &mut F,
        directory: &str,
        identifier: &str,
    ) -> Result<SingleResult, FetchError> {
        let file = self.resolver.resolve(files, directory, identifier)?;
        let content =
            self.tail
                .fetch_tail(files, &file)
                .map_err(|err| FetchError::FetchFailure {
                    identifier: identifier.to_string(),
                    reason: failure_reason(&err),
                })?;
        Ok(SingleResult {
            filename: file.filename(),
            content,
        })
    }

    fn fetch_batch<F: RemoteFiles + ?Sized>(
        &self,
        files: &mut F,
        directory: &str,
        identifiers: &[String],
    ) -> Result<BundleResult, FetchError> {
        let mut ledger = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            // Unresolvable identifiers abort the whole batch; fetch failures only mark the entry.
            let file = self.resolver.resolve(files, directory, identifier)?;
            let outcome = match self.tail.fetch_tail(files, &file) {
                Ok(content) if content.is_empty() => {
                    ItemOutcome::error(identifier, EMPTY_FILE_REASON)
                }
                Ok(content) => ItemOutcome::success(identifier, content),
                Err(err) => {
                    warn!(identifier = %identifier, error = %err, "fetch failed");
                    ItemOutcome::error(identifier, failure_reason(&err))
                }
            };
            ledger.push(outcome);
        }

        if !ledger.iter().any(ItemOutcome::is_success) {
            return Err(FetchError::NoFilesFound { ledger });
        }

        let archive = archive::build(ledger.iter().filter_map(|outcome| {
            outcome
                .payload
                .as_deref()
                .map(|payload| (outcome.identifier.as_str(), payload))
        }))?;
        Ok(BundleResult { archive, ledger })
    }
}

fn failure_reason(err: &FetchError) -> String {
    err.detail()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

fn summarize(request: &FetchRequest, result: &Result<FetchResult, FetchError>) -> String {
    let head = format!(
        "fetch alias={} dir={} imeis={}",
        request.alias(),
        request.directory(),
        request.identifiers().join(",")
    );
    match result {
        Ok(FetchResult::Single(single)) => format!(
            "{head} -> ok file={} bytes={}",
            single.filename,
            single.content.len()
        ),
        Ok(FetchResult::Bundle(bundle)) => format!(
            "{head} -> ok bundle {}/{} succeeded{}",
            bundle.ledger.iter().filter(|o| o.is_success()).count(),
            bundle.ledger.len(),
            ledger_failures(&bundle.ledger)
        ),
        Err(FetchError::NoFilesFound { ledger }) => {
            format!("{head} -> no files found{}", ledger_failures(ledger))
        }
        Err(err) => format!("{head} -> error: {err}"),
    }
}

fn ledger_failures(ledger: &[ItemOutcome]) -> String {
    ledger
        .iter()
        .filter(|outcome| !outcome.is_success())
        .map(|outcome| {
            format!(
                "; {}: {}",
                outcome.identifier,
                outcome.reason.as_deref().unwrap_or("")
            )
        })
        .collect()
}
