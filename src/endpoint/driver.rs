//! Async driver executing [`Machine`] actions.
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, Sleep};

use super::machine::{Action, Machine};
use crate::connection::{self, ConnectionHandle, Connector, TaskMessage, TaskTx};
use crate::error::CloseReason;
use crate::log::trace;
use crate::request::Request;

/// Message from an [`Endpoint`][super::Endpoint] handle.
#[derive(Debug)]
pub(crate) enum Message {
    Submit(Request),
    CancelAll,
}

pub(crate) struct Driver {
    machine: Machine,
    connector: Rc<Connector>,
    timeout: Duration,
    conn: Option<ConnectionHandle>,
    timer: Option<Pin<Box<Sleep>>>,
    events_tx: TaskTx,
}

impl Driver {
    pub(crate) fn new(
        machine: Machine,
        connector: Connector,
        timeout: Duration,
    ) -> (Self, connection::TaskRx) {
        let (events_tx, events_rx) = connection::channel();
        let driver = Self {
            machine,
            connector: Rc::new(connector),
            timeout,
            conn: None,
            timer: None,
            events_tx,
        };
        (driver, events_rx)
    }

    /// Run until every handle is dropped and outstanding requests are settled.
    pub(crate) async fn run(
        mut self,
        mut messages: UnboundedReceiver<Message>,
        mut events: connection::TaskRx,
    ) {
        let mut open = true;

        loop {
            self.execute();

            if !open && self.machine.outstanding() == 0 && self.conn.is_none() {
                break;
            }

            let timer = &mut self.timer;
            tokio::select! {
                msg = messages.recv(), if open => match msg {
                    Some(Message::Submit(mut request)) => match request.prepare().await {
                        Ok(()) => self.machine.submit(request),
                        Err(err) => request.fail(err),
                    },
                    Some(Message::CancelAll) => self.machine.cancel_all(),
                    None => {
                        trace!("endpoint dropped");
                        open = false;
                        self.machine.cancel_all();
                    }
                },
                Some(event) = events.recv() => match event {
                    TaskMessage::Connected(id) => self.machine.on_connect(id),
                    TaskMessage::Data(id, data) => self.machine.on_read(id, &data),
                    TaskMessage::Closed(id, reason) => {
                        if self.conn.as_ref().is_some_and(|e| e.id() == id) {
                            self.conn = None;
                        }
                        self.machine.on_close(id, reason);
                    }
                },
                () = async {
                    match timer {
                        Some(sleep) => sleep.await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.timer = None;
                    self.machine.on_timeout();
                }
            }
        }
    }

    fn execute(&mut self) {
        while let Some(action) = self.machine.poll_action() {
            match action {
                Action::Connect { id } => {
                    let conn = ConnectionHandle::spawn(
                        id,
                        Rc::clone(&self.connector),
                        self.events_tx.clone(),
                    );
                    if let Some(old) = self.conn.replace(conn) {
                        old.abort();
                    }
                }
                Action::Write { id, head, body } => match &self.conn {
                    Some(conn) if conn.id() == id => conn.write(head, body),
                    _ => {
                        trace!("dropping write to stale connection #{id}");
                    }
                },
                Action::Close { id, after_writing } => {
                    let Some(conn) = self.conn.take_if(|e| e.id() == id) else {
                        continue;
                    };
                    if after_writing {
                        conn.close();
                    } else {
                        conn.abort();
                        self.machine.on_close(id, CloseReason::Local);
                    }
                }
                Action::ArmTimer => {
                    let deadline = Instant::now() + self.timeout;
                    match &mut self.timer {
                        Some(sleep) => sleep.as_mut().reset(deadline),
                        None => self.timer = Some(Box::pin(tokio::time::sleep_until(deadline))),
                    }
                }
                Action::DisarmTimer => self.timer = None,
            }
        }
    }
}
