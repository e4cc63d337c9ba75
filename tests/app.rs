use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;

use logfetch::app::{EMPTY_FILE_REASON, LogFetcher, LogSink, NoopSink};
use logfetch::archive;
use logfetch::config::{HostProfile, HostTable};
use logfetch::domain::{FetchRequest, FetchResult, ItemStatus};
use logfetch::error::FetchError;
use logfetch::remote::{CommandOutput, RemoteConnector, RemoteSession};

#[derive(Default)]
struct RemoteState {
    files: HashMap<String, (String, String)>,
    broken: HashSet<String>,
    broken_tails: HashSet<String>,
    refuse_connect: Option<String>,
    connects: usize,
    closes: usize,
    commands: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    fn with_file(self, path: &str, stdout: &str) -> Self {
        self.with_output(path, stdout, "")
    }

    fn with_output(self, path: &str, stdout: &str, stderr: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), (stdout.to_string(), stderr.to_string()));
        self
    }

    fn with_broken_check(self, path: &str) -> Self {
        self.state.lock().unwrap().broken.insert(path.to_string());
        self
    }

    fn with_broken_tail(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .broken_tails
            .insert(path.to_string());
        self
    }

    fn refusing(self, reason: &str) -> Self {
        self.state.lock().unwrap().refuse_connect = Some(reason.to_string());
        self
    }

    fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }
}

struct FakeSession {
    state: Arc<Mutex<RemoteState>>,
}

impl RemoteConnector for FakeRemote {
    type Session = FakeSession;

    fn connect(&self, _profile: &HostProfile) -> Result<FakeSession, FetchError> {
        let mut guard = self.state.lock().unwrap();
        guard.connects += 1;
        if let Some(reason) = &guard.refuse_connect {
            return Err(FetchError::Transport(reason.clone()));
        }
        Ok(FakeSession {
            state: Arc::clone(&self.state),
        })
    }
}

impl RemoteSession for FakeSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, FetchError> {
        let mut guard = self.state.lock().unwrap();
        guard.commands.push(command.to_string());

        if let Some(quoted) = command
            .strip_prefix("[ -f ")
            .and_then(|rest| rest.strip_suffix(" ]"))
        {
            let path = quoted.trim_matches('\'');
            if guard.broken.contains(path) {
                return Err(FetchError::Transport("connection reset".to_string()));
            }
            let code = if guard.files.contains_key(path) { 0 } else { 1 };
            return Ok(CommandOutput {
                code,
                ..CommandOutput::default()
            });
        }

        if let Some((_, quoted)) = command
            .strip_prefix("tail -n ")
            .and_then(|rest| rest.split_once(' '))
        {
            let path = quoted.trim_matches('\'');
            if guard.broken_tails.contains(path) {
                return Err(FetchError::Transport("channel dropped".to_string()));
            }
            let (stdout, stderr) = guard.files.get(path).cloned().unwrap_or_default();
            return Ok(CommandOutput {
                code: if stderr.is_empty() { 0 } else { 1 },
                stdout,
                stderr,
            });
        }

        Err(FetchError::Transport(format!("unexpected command {command}")))
    }

    fn close(&mut self) -> Result<(), FetchError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    records: RefCell<Vec<String>>,
}

impl LogSink for RecordingSink {
    fn record(&self, message: &str) {
        self.records.borrow_mut().push(message.to_string());
    }
}

fn fetcher(remote: &FakeRemote) -> LogFetcher<FakeRemote> {
    let hosts = HostTable::new().with_profile("bench1", HostProfile::new("10.0.0.5", "eng", "pw"));
    LogFetcher::new(remote.clone(), hosts, 50)
}

fn request(raw: &str) -> FetchRequest {
    FetchRequest::new("bench1", "/logs", raw).unwrap()
}

#[test]
fn single_prefers_txt_when_both_exist() {
    let remote = FakeRemote::default()
        .with_file("/logs/111.txt", "txt body")
        .with_file("/logs/111.xml", "xml body");

    let result = fetcher(&remote).fetch(&request("111"), &NoopSink).unwrap();

    let single = assert_matches!(result, FetchResult::Single(single) => single);
    assert_eq!(single.filename, "111.txt");
    assert_eq!(single.content, "txt body");
    assert!(!remote.commands().iter().any(|cmd| cmd.contains(".xml")));
    assert_eq!(remote.closes(), 1);
}

#[test]
fn single_falls_back_to_xml() {
    let remote = FakeRemote::default().with_file("/logs/222.xml", "<log/>");

    let result = fetcher(&remote).fetch(&request("222"), &NoopSink).unwrap();

    let single = assert_matches!(result, FetchResult::Single(single) => single);
    assert_eq!(single.filename, "222.xml");
    assert_eq!(
        remote.commands(),
        vec![
            "[ -f '/logs/222.txt' ]".to_string(),
            "[ -f '/logs/222.xml' ]".to_string(),
            "tail -n 50 '/logs/222.xml'".to_string(),
        ]
    );
}

#[test]
fn single_not_found_is_terminal() {
    let remote = FakeRemote::default();

    let err = fetcher(&remote).fetch(&request("333"), &NoopSink).unwrap_err();

    assert_matches!(err, FetchError::NotFound { identifier } if identifier == "333");
    assert_eq!(remote.connects(), 1);
    assert_eq!(remote.closes(), 1);
}

#[test]
fn single_empty_file_is_still_success() {
    let remote = FakeRemote::default().with_file("/logs/444.txt", "");

    let result = fetcher(&remote).fetch(&request("444"), &NoopSink).unwrap();

    let single = assert_matches!(result, FetchResult::Single(single) => single);
    assert_eq!(single.content, "");
}

#[test]
fn single_error_channel_output_fails_request() {
    let remote = FakeRemote::default().with_output(
        "/logs/555.txt",
        "partial",
        "tail: cannot open for reading: Permission denied",
    );

    let err = fetcher(&remote).fetch(&request("555"), &NoopSink).unwrap_err();

    assert_matches!(
        err,
        FetchError::FetchFailure { identifier, reason }
            if identifier == "555" && reason.contains("Permission denied")
    );
    assert_eq!(remote.closes(), 1);
}

#[test]
fn unknown_alias_never_connects() {
    let remote = FakeRemote::default().with_file("/logs/1.txt", "x");
    let request = FetchRequest::new("bench9", "/logs", "1").unwrap();

    let err = fetcher(&remote).fetch(&request, &NoopSink).unwrap_err();

    assert_matches!(err, FetchError::AliasNotFound(alias) if alias == "bench9");
    assert_eq!(remote.connects(), 0);
    assert_eq!(remote.closes(), 0);
}

#[test]
fn connect_failure_is_terminal() {
    let remote = FakeRemote::default()
        .with_file("/logs/1.txt", "x")
        .refusing("timed out while waiting for handshake");

    let err = fetcher(&remote).fetch(&request("1,2"), &NoopSink).unwrap_err();

    assert_matches!(err, FetchError::Transport(reason) if reason.contains("handshake"));
    assert!(remote.commands().is_empty());
}

#[test]
fn existence_check_transport_failure_reads_as_missing_file() {
    let remote = FakeRemote::default()
        .with_file("/logs/666.txt", "x")
        .with_broken_check("/logs/666.txt");

    let err = fetcher(&remote).fetch(&request("666"), &NoopSink).unwrap_err();

    assert_matches!(err, FetchError::NotFound { .. });
}

#[test]
fn batch_records_failures_and_archives_successes() {
    let remote = FakeRemote::default()
        .with_output("/logs/id1.txt", "", "tail: read error")
        .with_file("/logs/id2.xml", "line 1\nline 2\n");

    let result = fetcher(&remote)
        .fetch(&request("id1, id2"), &NoopSink)
        .unwrap();

    let bundle = assert_matches!(result, FetchResult::Bundle(bundle) => bundle);
    assert_eq!(bundle.ledger.len(), 2);
    assert_eq!(bundle.ledger[0].identifier, "id1");
    assert_eq!(bundle.ledger[0].status, ItemStatus::Error);
    assert_eq!(bundle.ledger[0].reason.as_deref(), Some("tail: read error"));
    assert_eq!(bundle.ledger[1].identifier, "id2");
    assert_eq!(bundle.ledger[1].status, ItemStatus::Success);

    let entries = archive::read_entries(&bundle.archive).unwrap();
    assert_eq!(
        entries,
        vec![("id2".to_string(), "line 1\nline 2\n".to_string())]
    );
    assert_eq!(remote.connects(), 1);
    assert_eq!(remote.closes(), 1);
}

#[test]
fn batch_transport_failure_on_tail_only_marks_that_entry() {
    let remote = FakeRemote::default()
        .with_file("/logs/a.txt", "never read")
        .with_broken_tail("/logs/a.txt")
        .with_file("/logs/b.txt", "ok");

    let result = fetcher(&remote).fetch(&request("a,b"), &NoopSink).unwrap();

    let bundle = assert_matches!(result, FetchResult::Bundle(bundle) => bundle);
    assert_eq!(bundle.ledger.len(), 2);
    assert_eq!(bundle.ledger[0].identifier, "a");
    assert_eq!(bundle.ledger[0].status, ItemStatus::Error);
    assert_eq!(bundle.ledger[0].reason.as_deref(), Some("channel dropped"));
    assert_eq!(bundle.ledger[1].status, ItemStatus::Success);

    let entries = archive::read_entries(&bundle.archive).unwrap();
    assert_eq!(entries, vec![("b".to_string(), "ok".to_string())]);
    assert!(remote.commands().contains(&"tail -n 50 '/logs/b.txt'".to_string()));
    assert_eq!(remote.closes(), 1);
}

#[test]
fn batch_ledger_follows_input_order() {
    let remote = FakeRemote::default()
        .with_file("/logs/c.txt", "c")
        .with_file("/logs/a.txt", "a")
        .with_file("/logs/b.xml", "b");

    let result = fetcher(&remote)
        .fetch(&request("c\na\nb\na"), &NoopSink)
        .unwrap();

    let bundle = assert_matches!(result, FetchResult::Bundle(bundle) => bundle);
    let order = bundle
        .ledger
        .iter()
        .map(|outcome| outcome.identifier.as_str())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["c", "a", "b", "a"]);

    let names = archive::read_entries(&bundle.archive)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["c", "a", "b"]);
}

#[test]
fn batch_missing_file_aborts_whole_request() {
    let remote = FakeRemote::default()
        .with_file("/logs/a.txt", "a")
        .with_file("/logs/c.txt", "c");

    let err = fetcher(&remote)
        .fetch(&request("a,b,c"), &NoopSink)
        .unwrap_err();

    assert_matches!(err, FetchError::NotFound { identifier } if identifier == "b");
    assert!(!remote.commands().iter().any(|cmd| cmd.contains("/logs/c.")));
    assert_eq!(remote.closes(), 1);
}

#[test]
fn batch_without_successes_reports_ledger() {
    let remote = FakeRemote::default()
        .with_file("/logs/a.txt", "")
        .with_output("/logs/b.txt", "", "tail: Input/output error");

    let err = fetcher(&remote)
        .fetch(&request("a,b"), &NoopSink)
        .unwrap_err();

    let ledger = assert_matches!(err, FetchError::NoFilesFound { ledger } => ledger);
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].reason.as_deref(), Some(EMPTY_FILE_REASON));
    assert_eq!(ledger[1].reason.as_deref(), Some("tail: Input/output error"));
    assert!(ledger.iter().all(|outcome| outcome.payload.is_none()));
    assert_eq!(remote.closes(), 1);
}

#[test]
fn sink_gets_one_record_per_request() {
    let remote = FakeRemote::default().with_file("/logs/a.txt", "a");
    let sink = RecordingSink::default();
    let fetcher = fetcher(&remote);

    fetcher.fetch(&request("a"), &sink).unwrap();
    fetcher.fetch(&request("zzz"), &sink).unwrap_err();

    let records = sink.records.borrow();
    assert_eq!(records.len(), 2);
    assert!(records[0].contains("file=a.txt"));
    assert!(records[1].contains("does not exist"));
    assert_eq!(remote.closes(), 2);
}
