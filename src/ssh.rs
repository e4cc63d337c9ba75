use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

use ssh2::{Channel, KeyboardInteractivePrompt, Prompt, Session};
use tracing::{debug, info};

use crate::config::HostProfile;
use crate::error::FetchError;
use crate::remote::{CommandOutput, RemoteConnector, RemoteSession};

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// SSH over libssh2, authenticating with a private key or a password.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }

    fn open_tcp(profile: &HostProfile) -> Result<TcpStream, FetchError> {
        let addrs = (profile.host.as_str(), profile.port)
            .to_socket_addrs()
            .map_err(|err| {
                FetchError::Transport(format!("resolve {}:{}: {err}", profile.host, profile.port))
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, profile.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, error = %err, "tcp connect attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(FetchError::Transport(match last_error {
            Some(err) => format!("connect {}:{}: {err}", profile.host, profile.port),
            None => format!("no address for {}:{}", profile.host, profile.port),
        }))
    }
}

impl RemoteConnector for SshConnector {
    type Session = SshSession;

    fn connect(&self, profile: &HostProfile) -> Result<SshSession, FetchError> {
        info!(
            host = %profile.host,
            port = profile.port,
            user = %profile.username,
            "connecting"
        );
        let tcp = Self::open_tcp(profile)?;

        let mut session = Session::new().map_err(map_ssh_error)?;
        session.set_timeout(timeout_ms(profile.ready_timeout));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(map_ssh_error)?;

        if let Some(key_path) = profile.key_path.as_deref() {
            authenticate_with_key(&session, profile, key_path)?;
        }
        if !session.authenticated() {
            authenticate_with_password(&session, profile)?;
        }
        if !session.authenticated() {
            return Err(FetchError::Transport(format!(
                "authentication failed for {}@{}",
                profile.username, profile.host
            )));
        }

        // Ready timeout only bounds handshake and auth; commands run unbounded.
        session.set_timeout(0);
        Ok(SshSession {
            session,
            closed: false,
        })
    }
}

pub struct SshSession {
    session: Session,
    closed: bool,
}

impl RemoteSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, FetchError> {
        debug!(command, "exec");
        let mut channel = self.session.channel_session().map_err(map_ssh_error)?;
        channel.exec(command).map_err(map_ssh_error)?;

        // Both streams share the channel window, so they are drained together.
        self.session.set_blocking(false);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let drained = drain_channel(&mut channel, &mut stdout, &mut stderr);
        self.session.set_blocking(true);
        drained?;

        channel.wait_close().map_err(map_ssh_error)?;
        let code = channel.exit_status().map_err(map_ssh_error)?;

        Ok(CommandOutput {
            code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn close(&mut self) -> Result<(), FetchError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session
            .disconnect(None, "logfetch done", None)
            .map_err(map_ssh_error)
    }
}

fn drain_channel(
    channel: &mut Channel,
    stdout: &mut Vec<u8>,
    stderr: &mut Vec<u8>,
) -> Result<(), FetchError> {
    let mut buf = [0u8; 8192];
    loop {
        let mut progressed = read_available(channel, stdout, &mut buf)?;
        progressed |= read_available(&mut channel.stderr(), stderr, &mut buf)?;
        if !progressed {
            if channel.eof() {
                return Ok(());
            }
            thread::sleep(DRAIN_POLL);
        }
    }
}

fn read_available<R: Read>(
    reader: &mut R,
    out: &mut Vec<u8>,
    buf: &mut [u8],
) -> Result<bool, FetchError> {
    match reader.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            out.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(FetchError::Transport(err.to_string())),
    }
}

fn authenticate_with_key(
    session: &Session,
    profile: &HostProfile,
    key_path: &Path,
) -> Result<(), FetchError> {
    match session.userauth_pubkey_file(
        &profile.username,
        None,
        key_path,
        profile.passphrase.as_deref(),
    ) {
        Ok(()) => Ok(()),
        Err(err) if !profile.password.is_empty() => {
            debug!(
                key = %key_path.display(),
                error = %err,
                "key auth rejected, falling back to password"
            );
            Ok(())
        }
        Err(err) => Err(FetchError::Transport(format!(
            "key auth failed for {}@{} with {}: {err}",
            profile.username,
            profile.host,
            key_path.display()
        ))),
    }
}

fn authenticate_with_password(session: &Session, profile: &HostProfile) -> Result<(), FetchError> {
    if session
        .userauth_password(&profile.username, &profile.password)
        .is_err()
    {
        debug!("password auth rejected, trying keyboard-interactive");
        let mut prompt = PasswordPrompt(&profile.password);
        session
            .userauth_keyboard_interactive(&profile.username, &mut prompt)
            .map_err(map_ssh_error)?;
    }
    Ok(())
}

struct PasswordPrompt<'a>(&'a str);

impl KeyboardInteractivePrompt for PasswordPrompt<'_> {
    fn prompt<'p>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'p>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.0.to_string()).collect()
    }
}

fn timeout_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

fn map_ssh_error(err: ssh2::Error) -> FetchError {
    FetchError::Transport(err.to_string())
}
