//! Connection and queue orchestration, without IO.
//!
//! [`Machine`] consumes connection events and queues [`Action`]s for the driver to execute.
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::SystemTime;

use crate::body::WireBody;
use crate::common::ParseResult;
use crate::cookie::CookieJar;
use crate::error::{CloseReason, Error};
use crate::log::{debug, trace, warning};
use crate::proto::{Eof, Event, ParseError, ResponseParser};
use crate::request::{Request, Resolved};

/// Identifier of a physical connection, unique per endpoint.
pub(crate) type ConnId = u64;

/// IO requested by the [`Machine`].
#[derive(Debug)]
pub(crate) enum Action {
    /// Open a new connection.
    Connect { id: ConnId },
    /// Write the header block, followed by the body.
    Write { id: ConnId, head: Bytes, body: WireBody },
    /// Close the connection, after queued writes complete when `after_writing` is `true`.
    Close { id: ConnId, after_writing: bool },
    /// Start, or restart, the inactivity timer.
    ArmTimer,
    /// Stop the inactivity timer.
    DisarmTimer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disconnected,
    Connecting(ConnId),
    Ready(ConnId),
    /// Close requested, waiting for the connection to report it.
    Closing(ConnId),
}

/// Endpoint state machine.
///
/// Requests are written in submission order and matched with responses first in first out.
#[derive(Debug)]
pub(crate) struct Machine {
    jar: CookieJar,
    pipeline_limit: usize,
    state: State,
    next_id: ConnId,
    /// Requests not yet written.
    pending: VecDeque<Request>,
    /// Requests written, awaiting their response.
    in_flight: VecDeque<Request>,
    parser: ResponseParser,
    actions: VecDeque<Action>,
}

impl Machine {
    pub(crate) fn new(jar: CookieJar, pipeline_limit: usize) -> Self {
        Self {
            jar,
            pipeline_limit: pipeline_limit.max(1),
            state: State::Disconnected,
            next_id: 0,
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
            parser: ResponseParser::new(),
            actions: VecDeque::new(),
        }
    }

    /// Take the next action to execute.
    #[inline]
    pub(crate) fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Returns the number of unsettled requests.
    #[inline]
    pub(crate) fn outstanding(&self) -> usize {
        self.pending.len() + self.in_flight.len()
    }

    // ===== Events =====

    /// Queue a new request.
    pub(crate) fn submit(&mut self, request: Request) {
        trace!("queued {} {}", request.method(), request.uri().path());
        self.pending.push_back(request);
        self.dispatch();
    }

    pub(crate) fn on_connect(&mut self, id: ConnId) {
        if self.state != State::Connecting(id) {
            trace!("ignoring connect of stale connection #{id}");
            return;
        }
        debug!("connection #{id} established");
        self.state = State::Ready(id);
        self.parser = ResponseParser::new();
        self.actions.push_back(Action::ArmTimer);
        self.dispatch();
    }

    pub(crate) fn on_read(&mut self, id: ConnId, data: &[u8]) {
        if self.state != State::Ready(id) {
            trace!("ignoring {} bytes from connection #{id}", data.len());
            return;
        }
        self.actions.push_back(Action::ArmTimer);
        self.parser.feed(data);
        self.process(id);
    }

    pub(crate) fn on_close(&mut self, id: ConnId, reason: CloseReason) {
        match self.state {
            State::Connecting(current) if current == id => {
                debug!("connection #{id} failed: {reason}");
                self.state = State::Disconnected;
                self.actions.push_back(Action::DisarmTimer);
                if let Some(mut request) = self.pending.pop_front() {
                    request.fail(reason.to_error());
                }
                self.dispatch();
            }
            State::Ready(current) | State::Closing(current) if current == id => {
                debug!("connection #{id} {reason}");
                self.state = State::Disconnected;
                self.actions.push_back(Action::DisarmTimer);

                // only a clean EOF ends a close-delimited body
                let clean = matches!(reason, CloseReason::Eof);
                match self.parser.eof() {
                    Eof::Complete if clean => {
                        if let Some(mut request) = self.in_flight.pop_front() {
                            if request.resolve() == Resolved::Retry {
                                self.pending.push_front(request);
                            }
                        }
                    }
                    Eof::Partial if clean => {
                        if let Some(mut request) = self.in_flight.pop_front() {
                            request.fail(Error::PartialResponse);
                        }
                    }
                    Eof::Complete | Eof::Partial | Eof::Idle => {}
                }
                for mut request in self.in_flight.drain(..) {
                    request.fail(reason.to_error());
                }
                self.parser = ResponseParser::new();
                self.dispatch();
            }
            _ => {
                trace!("ignoring close of stale connection #{id}");
            }
        }
    }

    /// Inactivity timer expired.
    pub(crate) fn on_timeout(&mut self) {
        match self.state {
            State::Connecting(id) => {
                warning!("connection #{id} timed out while connecting");
                if let Some(mut request) = self.pending.pop_front() {
                    request.fail(Error::Timeout);
                }
                self.close(id, false);
            }
            State::Ready(id) if self.in_flight.is_empty() => {
                debug!("closing idle connection #{id}");
                self.close(id, true);
            }
            State::Ready(id) => {
                warning!("connection #{id} timed out with {} requests", self.in_flight.len());
                for mut request in self.in_flight.drain(..) {
                    request.fail(Error::Timeout);
                }
                self.close(id, false);
            }
            State::Closing(_) | State::Disconnected => {}
        }
    }

    /// Reject every request and close the connection.
    pub(crate) fn cancel_all(&mut self) {
        let count = self.outstanding();
        if count != 0 {
            debug!("cancelling {count} requests");
        }
        for mut request in self.in_flight.drain(..).chain(self.pending.drain(..)) {
            request.fail(Error::Cancelled);
        }
        match self.state {
            State::Connecting(id) | State::Ready(id) => self.close(id, false),
            State::Closing(_) | State::Disconnected => {}
        }
    }

    // ===== Internal =====

    fn process(&mut self, id: ConnId) {
        loop {
            let Some(request) = self.in_flight.front_mut() else {
                if !self.parser.is_idle() {
                    self.fail_connection(id, ParseError::Unsolicited);
                }
                return;
            };

            match self.parser.poll(request.method()) {
                ParseResult::Pending => return,
                ParseResult::Ok(Event::Head { head, set_cookie }) => {
                    trace!("#{id} {} {}", head.status, head.reason);
                    let uri = request.uri();
                    let now = SystemTime::now();
                    let cookies = self.jar.with(|store| {
                        for raw in &set_cookie {
                            store.set_at(uri, now, raw);
                        }
                        store.get_hash_at(uri, now)
                    });
                    request.on_head(head, cookies);
                }
                ParseResult::Ok(Event::Data(data)) => request.on_data(data),
                ParseResult::Ok(Event::Complete) => {
                    let keep_alive = request.response_keep_alive();
                    if !self.complete(id, keep_alive) {
                        return;
                    }
                }
                ParseResult::Err(err) => {
                    self.fail_connection(id, err);
                    return;
                }
            }
        }
    }

    /// Resolve the head request, returns `false` if the connection is closing.
    fn complete(&mut self, id: ConnId, keep_alive: bool) -> bool {
        let Some(mut request) = self.in_flight.pop_front() else {
            return true;
        };
        let resolved = request.resolve();

        if !keep_alive {
            if resolved == Resolved::Retry {
                self.pending.push_front(request);
            }
            self.close(id, true);
            return false;
        }

        if resolved == Resolved::Retry {
            self.write(id, request);
        }
        self.dispatch();
        true
    }

    fn dispatch(&mut self) {
        match self.state {
            State::Disconnected if !self.pending.is_empty() => {
                self.next_id += 1;
                let id = self.next_id;
                debug!("opening connection #{id}");
                self.state = State::Connecting(id);
                self.actions.push_back(Action::Connect { id });
                self.actions.push_back(Action::ArmTimer);
            }
            State::Ready(id) => {
                while self.pending.front().is_some_and(|next| self.can_send(next)) {
                    let Some(request) = self.pending.pop_front() else {
                        break;
                    };
                    self.write(id, request);
                }
            }
            State::Disconnected | State::Connecting(_) | State::Closing(_) => {}
        }
    }

    fn can_send(&self, next: &Request) -> bool {
        if self.in_flight.is_empty() {
            return true;
        }
        next.pipeline()
            && self.in_flight.len() < self.pipeline_limit
            && self.in_flight.iter().all(|e| e.pipeline() && e.keepalive())
    }

    fn write(&mut self, id: ConnId, mut request: Request) {
        let (head, body) = request.encode(&self.jar);
        debug!("#{id} {} {}", request.method(), request.uri().path());
        self.actions.push_back(Action::Write { id, head, body });
        self.actions.push_back(Action::ArmTimer);
        self.in_flight.push_back(request);
    }

    fn fail_connection(&mut self, id: ConnId, err: ParseError) {
        warning!("connection #{id} invalid response: {err}");
        let mut requests = self.in_flight.drain(..);
        if let Some(mut request) = requests.next() {
            request.fail(Error::Parse(err));
        }
        for mut request in requests {
            request.fail(Error::Disconnected);
        }
        self.close(id, false);
    }

    fn close(&mut self, id: ConnId, after_writing: bool) {
        self.state = State::Closing(id);
        self.actions.push_back(Action::Close { id, after_writing });
        self.actions.push_back(Action::DisarmTimer);
    }
}
