//! One connection attempt and the state machine that drives its socket.
//!
//! ```text
//! Init --start--> Connecting --writable/send--> AwaitingResponse --readable--> Done
//!                     |                               |
//!                     +---- error / hangup / timeout -+-----------------------> Done
//! ```
//!
//! The socket is closed as soon as the attempt reaches `Done`.

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use log::trace;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use socket2::{Domain, SockAddr, Socket, Type};

use crate::error::AttemptError;
use crate::negotiation;
use crate::types::{AttemptResult, Protocol};
use crate::workspace::Triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Connecting,
    AwaitingResponse,
    Done,
}

/// Whether a handler call moved the attempt to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Finished,
}

pub struct Attempt {
    index: u64,
    target: String,
    port: u16,
    username: String,
    password: String,
    created: Instant,
    started: Option<Instant>,
    deadline: Option<Instant>,
    stream: Option<TcpStream>,
    state: State,
    outcome: Option<Result<Protocol, AttemptError>>,
    elapsed: Duration,
}

impl Attempt {
    pub fn new(index: u64, triple: Triple<'_>, port: u16) -> Self {
        Self {
            index,
            target: triple.target.to_string(),
            port,
            username: triple.username.to_string(),
            password: triple.password.to_string(),
            created: Instant::now(),
            started: None,
            deadline: None,
            stream: None,
            state: State::Init,
            outcome: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// When the current phase expires, if the attempt is still in flight.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::Connecting | State::AwaitingResponse => self.deadline,
            _ => None,
        }
    }

    /// Open a non-blocking socket, issue the connect and register for readiness.
    pub fn start(&mut self, registry: &Registry, token: Token, connect_timeout: Duration) -> Progress {
        if self.state != State::Init {
            return self.progress();
        }
        let now = Instant::now();
        self.started = Some(now);

        let ip: IpAddr = match self.target.trim().parse() {
            Ok(ip) => ip,
            Err(_) => {
                let target = self.target.clone();
                return self.finish(Err(AttemptError::InvalidAddress(target)));
            }
        };
        let mut stream = match connect_nonblocking(SocketAddr::new(ip, self.port)) {
            Ok(s) => s,
            Err(e) => return self.finish(Err(e)),
        };
        if let Err(e) = registry.register(
            &mut stream,
            token,
            Interest::WRITABLE | Interest::READABLE,
        ) {
            return self.finish(Err(AttemptError::Register(e)));
        }
        trace!("#{} connecting to {}:{}", self.index, ip, self.port);
        self.stream = Some(stream);
        self.deadline = Some(now + connect_timeout);
        self.state = State::Connecting;
        Progress::Pending
    }

    /// Connection established (or failed): send the negotiation request in one write.
    pub fn on_writable(
        &mut self,
        registry: &Registry,
        token: Token,
        request: &[u8],
        response_timeout: Duration,
    ) -> Progress {
        if self.state != State::Connecting {
            return self.progress();
        }
        let Some(stream) = self.stream.as_mut() else {
            return self.finish(Err(AttemptError::Hangup));
        };
        match stream.take_error() {
            Ok(None) => {}
            Ok(Some(e)) | Err(e) => return self.finish(Err(AttemptError::Connect(e))),
        }
        match stream.peer_addr() {
            Ok(_) => {}
            Err(e) if still_connecting(&e) => return Progress::Pending,
            Err(e) => return self.finish(Err(AttemptError::Connect(e))),
        }
        let sent = match stream.write(request) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Progress::Pending,
            Err(e) => return self.finish(Err(AttemptError::Send(e))),
        };
        if sent != request.len() {
            return self.finish(Err(AttemptError::ShortWrite {
                sent,
                expected: request.len(),
            }));
        }
        if let Err(e) = registry.reregister(stream, token, Interest::READABLE) {
            return self.finish(Err(AttemptError::Register(e)));
        }
        trace!("#{} request sent", self.index);
        self.deadline = Some(Instant::now() + response_timeout);
        self.state = State::AwaitingResponse;
        Progress::Pending
    }

    /// Read the confirm with a single receive and classify it.
    pub fn on_readable(&mut self, buf: &mut [u8]) -> Progress {
        if self.state != State::AwaitingResponse {
            return self.progress();
        }
        let Some(stream) = self.stream.as_mut() else {
            return self.finish(Err(AttemptError::Hangup));
        };
        let n = loop {
            match stream.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Progress::Pending,
                Err(e) => return self.finish(Err(AttemptError::Receive(e))),
            }
        };
        if n == 0 {
            return self.finish(Err(AttemptError::Closed));
        }
        let outcome = negotiation::decode_response(&buf[..n]).map_err(AttemptError::from);
        self.finish(outcome)
    }

    /// Error or hang-up reported by the poller.
    pub fn on_error(&mut self) -> Progress {
        if self.is_done() {
            return Progress::Finished;
        }
        let pending = self
            .stream
            .as_ref()
            .and_then(|s| s.take_error().ok().flatten());
        let err = match (self.state, pending) {
            (State::Connecting, Some(e)) => AttemptError::Connect(e),
            (_, Some(e)) => AttemptError::Receive(e),
            (_, None) => AttemptError::Hangup,
        };
        self.finish(Err(err))
    }

    /// Fail the attempt if its current phase has expired. Returns true if it just timed out.
    pub fn timed_out(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.finish(Err(AttemptError::Timeout));
                true
            }
            _ => false,
        }
    }

    /// Force completion with `err` unless already done.
    pub fn abort(&mut self, err: AttemptError) -> Progress {
        if self.is_done() {
            return Progress::Finished;
        }
        self.finish(Err(err))
    }

    /// Consume a finished attempt into its result.
    pub fn into_result(self) -> AttemptResult {
        let (success, protocol, message) = match self.outcome {
            Some(Ok(p)) => (true, Some(p), String::from("RDP service detected")),
            Some(Err(e)) => (false, None, e.to_string()),
            None => (false, None, String::from("not attempted")),
        };
        AttemptResult {
            index: self.index,
            target: self.target,
            port: self.port,
            username: self.username,
            password: self.password,
            success,
            protocol,
            elapsed: self.elapsed,
            message,
        }
    }

    fn finish(&mut self, outcome: Result<Protocol, AttemptError>) -> Progress {
        let from = self.started.unwrap_or(self.created);
        self.elapsed = from.elapsed();
        if let Err(e) = &outcome {
            trace!("#{} failed: {}", self.index, e);
        }
        self.outcome = Some(outcome);
        // Dropping the stream closes the descriptor, which also removes it from the poller.
        self.stream = None;
        self.state = State::Done;
        Progress::Finished
    }

    fn progress(&self) -> Progress {
        if self.is_done() {
            Progress::Finished
        } else {
            Progress::Pending
        }
    }
}

fn connect_nonblocking(addr: SocketAddr) -> Result<TcpStream, AttemptError> {
    let socket = Socket::new(
        Domain::for_address(addr),
        Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(AttemptError::Setup)?;
    socket.set_nonblocking(true).map_err(AttemptError::Setup)?;
    socket.set_nodelay(true).map_err(AttemptError::Setup)?;
    match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => {}
        Err(e) if connect_in_progress(&e) => {}
        Err(e) => return Err(AttemptError::Connect(e)),
    }
    Ok(TcpStream::from_std(socket.into()))
}

fn connect_in_progress(e: &io::Error) -> bool {
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    e.kind() == io::ErrorKind::WouldBlock
}

fn still_connecting(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotConnected || connect_in_progress(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;

    fn triple<'a>(target: &'a str) -> Triple<'a> {
        Triple {
            target,
            username: "admin",
            password: "secret",
        }
    }

    #[test]
    fn invalid_address_fails_immediately() {
        let poll = Poll::new().unwrap();
        let mut attempt = Attempt::new(7, triple("not-an-ip"), 3389);
        let step = attempt.start(poll.registry(), Token(0), Duration::from_secs(1));
        assert_eq!(step, Progress::Finished);
        let result = attempt.into_result();
        assert!(!result.success);
        assert_eq!(result.index, 7);
        assert!(result.message.starts_with("invalid address"));
    }

    #[test]
    fn handlers_ignore_wrong_state() {
        let poll = Poll::new().unwrap();
        let mut attempt = Attempt::new(0, triple("127.0.0.1"), 9);
        let mut buf = [0u8; 32];
        assert_eq!(attempt.on_readable(&mut buf), Progress::Pending);
        assert_eq!(
            attempt.on_writable(poll.registry(), Token(0), b"x", Duration::from_secs(1)),
            Progress::Pending
        );
        assert_eq!(attempt.state(), State::Init);
        assert!(attempt.deadline().is_none());
    }

    #[test]
    fn timeout_after_deadline() {
        let poll = Poll::new().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut attempt = Attempt::new(0, triple("127.0.0.1"), port);
        attempt.start(poll.registry(), Token(0), Duration::from_millis(50));
        assert_eq!(attempt.state(), State::Connecting);
        let later = Instant::now() + Duration::from_secs(1);
        assert!(attempt.timed_out(later));
        assert!(attempt.is_done());
        assert!(!attempt.timed_out(later));
        assert_eq!(attempt.into_result().message, "timeout");
    }

    #[test]
    fn abort_marks_cancelled() {
        let mut attempt = Attempt::new(3, triple("127.0.0.1"), 3389);
        assert_eq!(attempt.abort(AttemptError::Cancelled), Progress::Finished);
        assert_eq!(attempt.abort(AttemptError::Timeout), Progress::Finished);
        assert_eq!(attempt.into_result().message, "cancelled");
    }
}
