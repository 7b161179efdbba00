use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use super::error::ProbeError;
use super::hosts::ResolveHost;
use super::types::SmtpReply;

const MAX_REPLY_LINES: usize = 64;
const MAX_LINE_LEN: usize = 4096;

enum StreamState {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Invalid,
}

/// A client connection to one exchanger. Every read and write is bounded by
/// the deadline of the attempt.
pub(crate) struct SmtpSession {
    state: StreamState,
    buffer: Vec<u8>,
    deadline: Instant,
}

impl SmtpSession {
    /// Address literals skip DNS; names are looked up within what is left
    /// of the attempt's budget.
    pub(crate) fn resolve(
        hosts: &dyn ResolveHost,
        host: &str,
        port: u16,
        deadline: Instant,
    ) -> Result<Vec<SocketAddr>, ProbeError> {
        let ips = match host.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => {
                let remaining = remaining_until(deadline).ok_or(ProbeError::Timeout)?;
                hosts.resolve_host(host, remaining)?
            }
        };
        let addrs: Vec<SocketAddr> = ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect();
        if addrs.is_empty() {
            return Err(ProbeError::NoAddress {
                host: host.to_string(),
            });
        }
        Ok(addrs)
    }

    /// Tries each address in turn until one accepts the connection.
    pub(crate) fn connect(
        host: &str,
        addrs: &[SocketAddr],
        deadline: Instant,
    ) -> Result<(Self, SocketAddr), ProbeError> {
        let mut last_err = None;
        for addr in addrs {
            let Some(remaining) = remaining_until(deadline) else {
                return Err(ProbeError::Timeout);
            };
            match TcpStream::connect_timeout(addr, remaining) {
                Ok(stream) => {
                    let session = Self {
                        state: StreamState::Plain(stream),
                        buffer: Vec::new(),
                        deadline,
                    };
                    return Ok((session, *addr));
                }
                Err(err) => last_err = Some(ProbeError::connect(host, err)),
            }
        }
        Err(last_err.unwrap_or_else(|| ProbeError::NoAddress {
            host: host.to_string(),
        }))
    }

    pub(crate) fn send_command(&mut self, command: &str) -> Result<(), ProbeError> {
        let mut line = command.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.arm_timeouts()?;
        match &mut self.state {
            StreamState::Plain(stream) => {
                stream.write_all(&line).map_err(ProbeError::io)?;
                stream.flush().map_err(ProbeError::io)
            }
            StreamState::Tls(stream) => {
                stream.write_all(&line).map_err(ProbeError::io)?;
                stream.flush().map_err(ProbeError::io)
            }
            StreamState::Invalid => Err(ProbeError::Protocol("invalid stream state".into())),
        }
    }

    /// Reads a complete (possibly multi-line) reply.
    pub(crate) fn read_reply(&mut self) -> Result<SmtpReply, ProbeError> {
        let mut code = None;
        let mut message_lines = Vec::new();
        loop {
            let raw = self.read_line()?;
            if raw.len() < 3 {
                return Err(ProbeError::Protocol(format!("invalid SMTP reply: '{raw}'")));
            }
            let code_part = raw.get(..3).ok_or_else(|| {
                ProbeError::Protocol(format!("invalid SMTP reply: '{raw}'"))
            })?;
            let parsed_code = code_part.parse::<u16>().map_err(|_| {
                ProbeError::Protocol(format!("invalid SMTP status code: '{code_part}'"))
            })?;
            match code {
                Some(existing) if existing != parsed_code => {
                    return Err(ProbeError::Protocol(format!(
                        "inconsistent SMTP reply codes: {existing} vs {parsed_code}"
                    )));
                }
                Some(_) => {}
                None => code = Some(parsed_code),
            }
            let continuation = raw.as_bytes().get(3).copied() == Some(b'-');
            message_lines.push(raw.get(4..).unwrap_or_default().to_string());
            if !continuation {
                break;
            }
            if message_lines.len() >= MAX_REPLY_LINES {
                return Err(ProbeError::Protocol("SMTP reply has too many lines".into()));
            }
        }
        let code =
            code.ok_or_else(|| ProbeError::Protocol("SMTP reply missing status code".into()))?;
        Ok(SmtpReply {
            code,
            message: message_lines.join("\n"),
        })
    }

    /// Wraps the connection in TLS after a positive `STARTTLS` reply.
    pub(crate) fn upgrade_tls(
        &mut self,
        domain: &str,
        connector: &TlsConnector,
    ) -> Result<(), ProbeError> {
        let state = std::mem::replace(&mut self.state, StreamState::Invalid);
        let plain = match state {
            StreamState::Plain(stream) => stream,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(());
            }
            StreamState::Invalid => {
                return Err(ProbeError::Protocol("invalid stream state".into()));
            }
        };
        // anything buffered before the handshake was sent in clear text
        self.buffer.clear();
        arm(&plain, self.deadline)?;

        let tls = complete_handshake(connector, domain, plain, self.deadline)?;
        self.state = StreamState::Tls(Box::new(tls));
        Ok(())
    }

    pub(crate) fn is_tls(&self) -> bool {
        matches!(self.state, StreamState::Tls(_))
    }

    fn tcp(&self) -> Option<&TcpStream> {
        match &self.state {
            StreamState::Plain(stream) => Some(stream),
            StreamState::Tls(stream) => Some(stream.get_ref()),
            StreamState::Invalid => None,
        }
    }

    fn arm_timeouts(&self) -> Result<(), ProbeError> {
        let stream = self
            .tcp()
            .ok_or_else(|| ProbeError::Protocol("invalid stream state".into()))?;
        arm(stream, self.deadline)
    }

    fn read_line(&mut self) -> Result<String, ProbeError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buffer.len() > MAX_LINE_LEN {
                return Err(ProbeError::Protocol("SMTP reply line too long".into()));
            }

            self.arm_timeouts()?;
            let mut buf = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf),
                StreamState::Tls(stream) => stream.read(&mut buf),
                StreamState::Invalid => {
                    return Err(ProbeError::Protocol("invalid stream state".into()));
                }
            };
            let read = read.map_err(ProbeError::io)?;
            if read == 0 {
                return Err(ProbeError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading reply",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}

/// Sets both socket timeouts to what is left before `deadline`.
fn arm(stream: &TcpStream, deadline: Instant) -> Result<(), ProbeError> {
    let remaining = remaining_until(deadline).ok_or(ProbeError::Timeout)?;
    stream
        .set_read_timeout(Some(remaining))
        .map_err(ProbeError::io)?;
    stream
        .set_write_timeout(Some(remaining))
        .map_err(ProbeError::io)
}

fn remaining_until(deadline: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        None
    } else {
        Some(remaining)
    }
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
    deadline: Instant,
) -> Result<TlsStream<TcpStream>, ProbeError> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(ProbeError::Tls { source: err }),
        Err(HandshakeError::WouldBlock(mut mid)) => loop {
            if let Err(err) = arm(mid.get_ref(), deadline) {
                break Err(err);
            }
            match mid.handshake() {
                Ok(tls) => break Ok(tls),
                Err(HandshakeError::Failure(err)) => {
                    break Err(ProbeError::Tls { source: err });
                }
                Err(HandshakeError::WouldBlock(next)) => mid = next,
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};
    use std::sync::Mutex;
    use std::thread;

    /// Answers every name with loopback and remembers the budgets it was given.
    #[derive(Default)]
    struct Loopback {
        budgets: Mutex<Vec<Duration>>,
    }

    impl ResolveHost for Loopback {
        fn resolve_host(&self, _host: &str, budget: Duration) -> Result<Vec<IpAddr>, ProbeError> {
            self.budgets.lock().expect("budgets lock").push(budget);
            Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
        }
    }

    fn pair(server_bytes: &'static [u8]) -> (SmtpSession, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                stream.write_all(server_bytes).ok();
                stream.flush().ok();
                // keep the socket open until the client is done reading
                let mut sink = [0u8; 64];
                let _ = stream.read(&mut sink);
            }
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        let (session, _) = SmtpSession::connect("loopback", &[addr], deadline).expect("connect");
        (session, handle)
    }

    #[test]
    fn address_literal_skips_dns() {
        let hosts = Loopback::default();
        let deadline = Instant::now() + Duration::from_secs(5);
        let addrs = SmtpSession::resolve(&hosts, "192.0.2.7", 25, deadline).expect("literal");
        assert_eq!(addrs, vec!["192.0.2.7:25".parse::<SocketAddr>().expect("addr")]);
        assert!(hosts.budgets.lock().expect("budgets lock").is_empty());
    }

    #[test]
    fn name_lookup_gets_the_remaining_budget() {
        let hosts = Loopback::default();
        let budget = Duration::from_secs(5);
        let deadline = Instant::now() + budget;
        let addrs = SmtpSession::resolve(&hosts, "mx.mock.test", 2525, deadline).expect("lookup");
        assert_eq!(addrs, vec!["127.0.0.1:2525".parse::<SocketAddr>().expect("addr")]);
        let budgets = hosts.budgets.lock().expect("budgets lock").clone();
        assert_eq!(budgets.len(), 1);
        assert!(budgets[0] <= budget && !budgets[0].is_zero(), "{budgets:?}");
    }

    #[test]
    fn expired_deadline_stops_before_lookup() {
        let hosts = Loopback::default();
        let err = SmtpSession::resolve(&hosts, "mx.mock.test", 25, Instant::now())
            .expect_err("no time left");
        assert!(err.is_timeout(), "{err:?}");
        assert!(hosts.budgets.lock().expect("budgets lock").is_empty());
    }

    #[test]
    fn reads_multiline_reply() {
        let (mut session, handle) =
            pair(b"250-mx.example greets you\r\n250-PIPELINING\r\n250 STARTTLS\r\n");
        let reply = session.read_reply().expect("reply");
        assert_eq!(reply.code, 250);
        assert!(reply.has_capability("STARTTLS"));
        assert_eq!(reply.message.lines().count(), 3);
        session.send_command("QUIT").ok();
        handle.join().expect("server thread");
    }

    #[test]
    fn rejects_inconsistent_codes() {
        let (mut session, handle) = pair(b"250-first\r\n550 second\r\n");
        let err = session.read_reply().expect_err("mixed codes");
        assert!(matches!(err, ProbeError::Protocol(_)));
        session.send_command("QUIT").ok();
        handle.join().expect("server thread");
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_millis(600));
                drop(stream);
            }
        });
        let deadline = Instant::now() + Duration::from_millis(200);
        let (mut session, _) =
            SmtpSession::connect("loopback", &[addr], deadline).expect("connect");
        let err = session.read_reply().expect_err("no greeting");
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        handle.join().expect("server thread");
    }

    #[test]
    fn stalled_tls_handshake_stops_at_the_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                // accepts TCP but never answers the ClientHello
                thread::sleep(Duration::from_millis(1500));
                drop(stream);
            }
        });
        let budget = Duration::from_millis(300);
        let started = Instant::now();
        let (mut session, _) =
            SmtpSession::connect("loopback", &[addr], started + budget).expect("connect");
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("connector");

        let err = session
            .upgrade_tls("mx.mock.test", &connector)
            .expect_err("no handshake");
        let elapsed = started.elapsed();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        assert!(elapsed < budget + Duration::from_millis(200), "took {elapsed:?}");
        handle.join().expect("server thread");
    }
}
