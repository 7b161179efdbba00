use std::sync::Arc;
use std::time::Instant;

use native_tls::TlsConnector;
use tracing::debug;

use crate::classifier::Address;

use super::CandidateProber;
use super::error::ProbeError;
use super::hosts::ResolveHost;
use super::options::ProbeOptions;
use super::session::SmtpSession;
use super::types::AttemptOutcome::{Accepted, Inconclusive, Rejected};
use super::types::AttemptStage as Stage;
use super::types::{AttemptOutcome, ServerAttempt, SmtpEvent as Event, SmtpReply};

/// Live SMTP implementation of [`CandidateProber`].
///
/// Each attempt resolves the exchanger through `hosts`, opens a fresh
/// connection, walks greeting → `EHLO` → optional `STARTTLS` → `MAIL FROM` →
/// `RCPT TO`, and quits. `DATA` is never sent. One deadline of
/// `options.timeout` covers the whole attempt, address lookup included.
#[derive(Clone)]
pub struct SmtpProber {
    options: ProbeOptions,
    connector: TlsConnector,
    hosts: Arc<dyn ResolveHost>,
}

impl std::fmt::Debug for SmtpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpProber")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SmtpProber {
    pub fn new(options: ProbeOptions, hosts: Arc<dyn ResolveHost>) -> Result<Self, ProbeError> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .danger_accept_invalid_hostnames(options.accept_invalid_certs)
            .build()
            .map_err(|source| ProbeError::Tls { source })?;
        Ok(Self {
            options,
            connector,
            hosts,
        })
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }
}

impl CandidateProber for SmtpProber {
    fn attempt(&self, exchanger: &str, target: &Address) -> ServerAttempt {
        let mut attempt = ServerAttempt::new(exchanger);
        attempt.outcome = match run_dialogue(self, target, &mut attempt) {
            Ok(outcome) => outcome,
            Err(outcome) => outcome,
        };
        debug!(
            exchanger,
            address = %target,
            outcome = %attempt.outcome,
            "exchanger attempt finished"
        );
        attempt
    }
}

/// Drives one session. `Err` carries the outcome of a dialogue cut short.
fn run_dialogue(
    prober: &SmtpProber,
    target: &Address,
    attempt: &mut ServerAttempt,
) -> Result<AttemptOutcome, AttemptOutcome> {
    let options = &prober.options;
    let deadline = Instant::now() + options.timeout;
    let host = attempt.exchange.clone();
    let addrs = SmtpSession::resolve(prober.hosts.as_ref(), &host, options.port, deadline)
        .map_err(|err| fail(attempt, Stage::Resolve, err, "could not resolve exchanger"))?;

    let (mut session, peer) = SmtpSession::connect(&host, &addrs, deadline)
        .map_err(|err| fail(attempt, Stage::Connect, err, "connection failed"))?;
    attempt.address = Some(peer.to_string());

    let greeting = session
        .read_reply()
        .map_err(|err| fail(attempt, Stage::Greeting, err, "no greeting"))?;
    record_reply(attempt, Stage::Greeting, &greeting);
    if !greeting.is_positive_completion() {
        send_quit(&mut session, attempt);
        return Err(refused("greeting refused", greeting));
    }

    let helo = options.helo_name().into_owned();
    let mut ehlo = exchange(&mut session, attempt, Stage::Ehlo, &format!("EHLO {helo}"))?;
    if !ehlo.is_positive_completion() {
        let helo_reply = exchange(&mut session, attempt, Stage::Helo, &format!("HELO {helo}"))?;
        if !helo_reply.is_positive_completion() {
            send_quit(&mut session, attempt);
            return Err(refused("HELO refused", helo_reply));
        }
        ehlo = helo_reply;
    }

    if options.starttls && ehlo.has_capability("STARTTLS") {
        let reply = exchange(&mut session, attempt, Stage::StartTls, "STARTTLS")?;
        if reply.is_positive_completion() {
            session
                .upgrade_tls(&host, &prober.connector)
                .map_err(|err| fail(attempt, Stage::StartTls, err, "TLS handshake failed"))?;
            let again = exchange(&mut session, attempt, Stage::Ehlo, &format!("EHLO {helo}"))?;
            if !again.is_positive_completion() {
                send_quit(&mut session, attempt);
                return Err(refused("EHLO refused after STARTTLS", again));
            }
        }
        // a refused STARTTLS leaves the clear-text session usable
    }

    let mail_reply = exchange(
        &mut session,
        attempt,
        Stage::MailFrom,
        &options.mail_from_command(),
    )?;
    if !mail_reply.is_positive_completion() {
        send_quit(&mut session, attempt);
        return Err(refused("MAIL FROM refused", mail_reply));
    }

    let rcpt_cmd = format!("RCPT TO:<{}>", target.corrected());
    let rcpt_reply = exchange(&mut session, attempt, Stage::RcptTo, &rcpt_cmd)?;
    send_quit(&mut session, attempt);
    debug!(exchanger = %host, tls = session.is_tls(), code = rcpt_reply.code, "RCPT TO answered");
    Ok(classify_rcpt(rcpt_reply))
}

/// Maps the `RCPT TO` reply onto a per-candidate outcome.
pub(crate) fn classify_rcpt(reply: SmtpReply) -> AttemptOutcome {
    if reply.is_positive_completion() {
        return Accepted { reply };
    }
    if reply.is_policy_block() {
        return refused("policy block", reply);
    }
    if (550..=554).contains(&reply.code) {
        return Rejected { reply };
    }
    if reply.is_transient_failure() {
        return refused("temporary failure", reply);
    }
    refused("unexpected response", reply)
}

fn refused(what: &str, reply: SmtpReply) -> AttemptOutcome {
    Inconclusive {
        reason: format!("{what} ({reply})"),
        reply: Some(reply),
    }
}

fn fail(attempt: &mut ServerAttempt, stage: Stage, err: ProbeError, what: &str) -> AttemptOutcome {
    attempt.events.push(Event::Error {
        stage,
        message: err.to_string(),
    });
    AttemptOutcome::inconclusive(format!("{what}: {err}"))
}

fn record_reply(attempt: &mut ServerAttempt, stage: Stage, reply: &SmtpReply) {
    attempt.events.push(Event::Received {
        stage,
        reply: reply.clone(),
    });
}

/// Sends `command` and reads its reply, recording both.
fn exchange(
    session: &mut SmtpSession,
    attempt: &mut ServerAttempt,
    stage: Stage,
    command: &str,
) -> Result<SmtpReply, AttemptOutcome> {
    attempt.events.push(Event::Sent {
        stage,
        command: command.to_string(),
    });
    session
        .send_command(command)
        .map_err(|err| fail(attempt, stage, err, "send failed"))?;
    let reply = session
        .read_reply()
        .map_err(|err| fail(attempt, stage, err, "no reply"))?;
    record_reply(attempt, stage, &reply);
    Ok(reply)
}

fn send_quit(session: &mut SmtpSession, attempt: &mut ServerAttempt) {
    const QUIT_CMD: &str = "QUIT";
    attempt.events.push(Event::Sent {
        stage: Stage::Quit,
        command: QUIT_CMD.to_string(),
    });
    if let Err(err) = session.send_command(QUIT_CMD) {
        attempt.events.push(Event::Error {
            stage: Stage::Quit,
            message: err.to_string(),
        });
        return;
    }
    match session.read_reply() {
        Ok(reply) => record_reply(attempt, Stage::Quit, &reply),
        Err(err) => attempt.events.push(Event::Error {
            stage: Stage::Quit,
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use std::io::{self, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn reply(code: u16, message: &str) -> SmtpReply {
        SmtpReply::new(code, message)
    }

    #[test]
    fn rcpt_codes_map_to_outcomes() {
        assert!(matches!(classify_rcpt(reply(250, "2.1.5 Ok")), Accepted { .. }));
        assert!(matches!(classify_rcpt(reply(251, "will forward")), Accepted { .. }));
        for code in [550, 551, 552, 553, 554] {
            assert!(
                matches!(classify_rcpt(reply(code, "5.1.1 no such user")), Rejected { .. }),
                "{code} should be a rejection"
            );
        }
        for code in [421, 450, 451, 452] {
            assert!(matches!(
                classify_rcpt(reply(code, "try later")),
                Inconclusive { .. }
            ));
        }
        assert!(matches!(
            classify_rcpt(reply(503, "bad sequence")),
            Inconclusive { .. }
        ));
    }

    #[test]
    fn policy_rejection_is_inconclusive() {
        let outcome = classify_rcpt(reply(550, "5.7.1 Client host rejected: listed at zen"));
        match outcome {
            Inconclusive { reason, reply } => {
                assert!(reason.starts_with("policy block"), "{reason}");
                assert_eq!(reply.map(|r| r.code), Some(550));
            }
            other => panic!("expected inconclusive, got {other:?}"),
        }
    }

    const GREETING: &str = "220 mock.smtp.test ESMTP\r\n";

    /// One scripted server step.
    enum Step {
        /// Expected command prefix and the raw reply.
        Reply(&'static str, &'static str),
        /// Accepts `STARTTLS` and switches the rest of the script to TLS.
        StartTls,
    }

    /// Resolves every exchanger name to loopback after `delay`.
    struct Loopback {
        delay: Duration,
    }

    impl ResolveHost for Loopback {
        fn resolve_host(
            &self,
            _host: &str,
            budget: Duration,
        ) -> Result<Vec<std::net::IpAddr>, ProbeError> {
            if self.delay > budget {
                thread::sleep(budget);
                return Err(ProbeError::Timeout);
            }
            thread::sleep(self.delay);
            Ok(vec![std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)])
        }
    }

    fn spawn_mock_server(
        greeting: &'static str,
        script: Vec<Step>,
    ) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("addr").port();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            ready_tx.send(()).ok();
            if let Ok((stream, _)) = listener.accept() {
                let _ = serve(stream, greeting, script);
            }
        });
        ready_rx.recv().expect("server ready");
        (port, handle)
    }

    fn serve(mut stream: TcpStream, greeting: &str, script: Vec<Step>) -> io::Result<()> {
        stream.write_all(greeting.as_bytes())?;
        stream.flush()?;
        let mut steps = script.into_iter();
        if play(&mut stream, &mut steps)? {
            let mut tls = acceptor()
                .accept(stream)
                .map_err(|err| io::Error::other(err.to_string()))?;
            play(&mut tls, &mut steps)?;
        }
        Ok(())
    }

    /// Runs steps until the script ends or switches to TLS (returns `true`).
    fn play<S: Read + Write>(
        stream: &mut S,
        steps: &mut impl Iterator<Item = Step>,
    ) -> io::Result<bool> {
        for step in steps {
            let (expected, response, upgrade) = match step {
                Step::Reply(expected, response) => (expected, response, false),
                Step::StartTls => ("STARTTLS", "220 2.0.0 Ready to start TLS\r\n", true),
            };
            let line = read_command(stream)?;
            assert!(
                line.starts_with(expected),
                "expected command starting with '{expected}', got '{line}'"
            );
            stream.write_all(response.as_bytes())?;
            stream.flush()?;
            if upgrade {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Byte at a time, so nothing past the command is consumed before a TLS switch.
    fn read_command<S: Read>(stream: &mut S) -> io::Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while stream.read(&mut byte)? == 1 {
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn acceptor() -> native_tls::TlsAcceptor {
        let identity = native_tls::Identity::from_pkcs8(
            include_bytes!("testdata/mock-smtp.crt"),
            include_bytes!("testdata/mock-smtp.key"),
        )
        .expect("test identity");
        native_tls::TlsAcceptor::new(identity).expect("tls acceptor")
    }

    fn prober_with(port: u16, timeout: Duration, lookup_delay: Duration) -> SmtpProber {
        SmtpProber::new(
            ProbeOptions {
                port,
                timeout,
                envelope_sender: "probe@verifier.test".to_string(),
                ..ProbeOptions::default()
            },
            Arc::new(Loopback {
                delay: lookup_delay,
            }),
        )
        .expect("tls connector")
    }

    fn prober(port: u16) -> SmtpProber {
        prober_with(port, Duration::from_secs(2), Duration::ZERO)
    }

    fn target(raw: &str) -> Address {
        Classifier::default()
            .classify(raw)
            .address()
            .cloned()
            .expect("parsable address")
    }

    fn sent(attempt: &ServerAttempt, prefix: &str) -> bool {
        attempt
            .events
            .iter()
            .any(|e| matches!(e, Event::Sent { command, .. } if command.starts_with(prefix)))
    }

    #[test]
    fn accepts_via_rcpt_to() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO verifier.test", "250-mock.example\r\n250 PIPELINING\r\n"),
                Step::Reply("MAIL FROM:<probe@verifier.test>", "250 2.1.0 Ok\r\n"),
                Step::Reply("RCPT TO:<user@example.com>", "250 2.1.5 Ok\r\n"),
                Step::Reply("QUIT", "221 2.0.0 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("mx.mock.test", &target("user@example.com"));
        assert!(matches!(attempt.outcome, Accepted { .. }), "{attempt:?}");
        assert_eq!(attempt.address.as_deref(), Some(format!("127.0.0.1:{port}").as_str()));
        assert_eq!(attempt.mail_from_reply().map(|r| r.code), Some(250));
        assert_eq!(attempt.rcpt_reply().map(|r| r.code), Some(250));
        assert!(!sent(&attempt, "DATA"));
        assert!(!sent(&attempt, "STARTTLS"));
        handle.join().expect("server thread");
    }

    #[test]
    fn rcpt_uses_corrected_address() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO", "250 mock.example\r\n"),
                Step::Reply("MAIL FROM:", "250 2.1.0 Ok\r\n"),
                Step::Reply("RCPT TO:<user@gmail.com>", "550 5.1.1 User unknown\r\n"),
                Step::Reply("QUIT", "221 2.0.0 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("127.0.0.1", &target("user@gmial.com"));
        match attempt.outcome {
            Rejected { reply } => assert_eq!(reply.code, 550),
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }

    #[test]
    fn falls_back_to_helo() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO", "502 5.5.2 Command not recognized\r\n"),
                Step::Reply("HELO", "250 mock.example\r\n"),
                Step::Reply("MAIL FROM:", "250 Ok\r\n"),
                Step::Reply("RCPT TO:", "451 4.3.0 Try again later\r\n"),
                Step::Reply("QUIT", "221 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("127.0.0.1", &target("user@example.com"));
        match attempt.outcome {
            Inconclusive { reason, .. } => assert!(reason.starts_with("temporary failure")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }

    #[test]
    fn refused_sender_is_inconclusive() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO", "250 mock.example\r\n"),
                Step::Reply("MAIL FROM:", "553 5.7.1 Sender address rejected\r\n"),
                Step::Reply("QUIT", "221 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("127.0.0.1", &target("user@example.com"));
        assert!(matches!(attempt.outcome, Inconclusive { .. }));
        assert_eq!(attempt.rcpt_reply(), None);
        handle.join().expect("server thread");
    }

    #[test]
    fn refused_greeting_is_inconclusive() {
        let (port, handle) = spawn_mock_server(
            "554 5.3.2 Service not available\r\n",
            vec![Step::Reply("QUIT", "221 Bye\r\n")],
        );
        let attempt = prober(port).attempt("127.0.0.1", &target("user@example.com"));
        match attempt.outcome {
            Inconclusive { ref reason, ref reply } => {
                assert!(reason.starts_with("greeting refused"), "{reason}");
                assert_eq!(reply.as_ref().map(|r| r.code), Some(554));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!sent(&attempt, "EHLO"));
        handle.join().expect("server thread");
    }

    #[test]
    fn refused_starttls_continues_in_clear_text() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
                Step::Reply("STARTTLS", "454 4.7.0 TLS not available\r\n"),
                Step::Reply("MAIL FROM:", "250 2.1.0 Ok\r\n"),
                Step::Reply("RCPT TO:<user@example.com>", "250 2.1.5 Ok\r\n"),
                Step::Reply("QUIT", "221 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("mx.mock.test", &target("user@example.com"));
        assert!(matches!(attempt.outcome, Accepted { .. }), "{attempt:?}");
        assert!(sent(&attempt, "STARTTLS"));
        handle.join().expect("server thread");
    }

    #[test]
    fn starttls_upgrade_then_rcpt_over_tls() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
                Step::StartTls,
                Step::Reply("EHLO", "250 mock.example\r\n"),
                Step::Reply("MAIL FROM:", "250 2.1.0 Ok\r\n"),
                Step::Reply("RCPT TO:<nobody@example.com>", "550 5.1.1 User unknown\r\n"),
                Step::Reply("QUIT", "221 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("mx.mock.test", &target("nobody@example.com"));
        match attempt.outcome {
            Rejected { reply } => assert_eq!(reply.code, 550),
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }

    #[test]
    fn refused_ehlo_after_starttls_is_inconclusive() {
        let (port, handle) = spawn_mock_server(
            GREETING,
            vec![
                Step::Reply("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
                Step::StartTls,
                Step::Reply("EHLO", "554 5.7.0 Not welcome\r\n"),
                Step::Reply("QUIT", "221 Bye\r\n"),
            ],
        );
        let attempt = prober(port).attempt("mx.mock.test", &target("user@example.com"));
        match attempt.outcome {
            Inconclusive { ref reason, ref reply } => {
                assert!(reason.starts_with("EHLO refused after STARTTLS"), "{reason}");
                assert_eq!(reply.as_ref().map(|r| r.code), Some(554));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!sent(&attempt, "MAIL FROM"));
        handle.join().expect("server thread");
    }

    #[test]
    fn closed_port_is_inconclusive() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let attempt = prober(port).attempt("127.0.0.1", &target("user@example.com"));
        match attempt.outcome {
            Inconclusive { reason, reply } => {
                assert!(reason.starts_with("connection failed"), "{reason}");
                assert!(reply.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unresolvable_exchanger_is_inconclusive() {
        let prober = prober_with(25, Duration::from_millis(100), Duration::from_secs(5));
        let attempt = prober.attempt("mx.mock.test", &target("user@example.com"));
        match attempt.outcome {
            Inconclusive { reason, .. } => {
                assert!(reason.starts_with("could not resolve exchanger"), "{reason}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(attempt.address.is_none());
    }

    #[test]
    fn address_lookup_counts_against_the_attempt_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                thread::sleep(Duration::from_millis(250));
                let _ = stream.write_all(GREETING.as_bytes());
                thread::sleep(Duration::from_millis(300));
            }
        });

        // 300ms lookup + 250ms greeting delay overruns a 400ms budget
        let prober = prober_with(port, Duration::from_millis(400), Duration::from_millis(300));
        let attempt = prober.attempt("mx.mock.test", &target("user@example.com"));
        match attempt.outcome {
            Inconclusive { reason, .. } => {
                assert!(reason.starts_with("no greeting: timed out"), "{reason}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }
}
