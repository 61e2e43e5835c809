//! PTP transaction engine.
//!
//! One `PtpSession` per connected camera. It owns the transport, sequences
//! transaction ids, runs the command/data/response phases of each exchange
//! and classifies the outcome. Callers above it (the dispatcher) hold the
//! device message lock, so at most one transaction is in flight per device.

use crate::codes::{self, CodeClass, Resolver};
use crate::protocol::{self, Container, ContainerKind};
use crate::transport::Transport;
use crate::vendor::Vendor;
use crate::{PtpError, Result};

/// Read buffer for one bulk transfer. Large enough for any command phase
/// and for liveview frame chunks.
const READ_CHUNK: usize = 64 * 1024;

/// Session id used by convention when opening a session.
pub const DEFAULT_SESSION_ID: u32 = 1;

/// Result of one PTP exchange: the response code and any data-phase payload.
/// Transport failures are reported as errors instead; a non-OK response is a
/// normal outcome so callers can branch on the specific code.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub response: u16,
    pub data: Vec<u8>,
}

impl TransactionOutcome {
    pub fn ok(&self) -> bool {
        self.response == codes::rsp::OK
    }

    /// Unwrap the data payload, turning a non-OK response into an error.
    pub fn require_ok(self) -> Result<Vec<u8>> {
        if self.ok() {
            Ok(self.data)
        } else {
            Err(PtpError::Response(self.response))
        }
    }
}

/// An asynchronous PTP event, either read from the interrupt endpoint or
/// synthesized by a vendor extension from polled device status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpEvent {
    pub code: u16,
    pub params: Vec<u32>,
}

/// An open transport plus PTP session state.
pub struct PtpSession {
    transport: Box<dyn Transport>,
    vendor: Vendor,
    resolver: &'static Resolver,
    session_id: u32,
    transaction_id: u32,
    last_response: u16,
}

impl PtpSession {
    pub fn new(transport: Box<dyn Transport>, vendor: Vendor) -> PtpSession {
        PtpSession {
            transport,
            vendor,
            resolver: codes::resolver_for(vendor),
            session_id: 0,
            transaction_id: 0,
            last_response: codes::rsp::OK,
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn resolver(&self) -> &'static Resolver {
        self.resolver
    }

    /// Current session id; 0 means no session is open.
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Last transaction id issued; resets with the session.
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// Response code of the most recent exchange.
    pub fn last_response(&self) -> u16 {
        self.last_response
    }

    /// Open a PTP session with id 1.
    ///
    /// Cameras left in a stale session by an ungraceful disconnect answer
    /// `SessionAlreadyOpen`; in that case issue CloseSession and retry the
    /// open exactly once before surfacing the failure.
    pub fn open_session(&mut self) -> Result<()> {
        self.session_id = 0;
        self.transaction_id = 0;
        let mut outcome = self.transact(codes::op::OPEN_SESSION, &[DEFAULT_SESSION_ID], None, 0)?;
        if outcome.response == codes::rsp::SESSION_ALREADY_OPEN {
            log::info!("stale session on camera, closing and retrying open");
            let _ = self.transact(codes::op::CLOSE_SESSION, &[], None, 0)?;
            outcome = self.transact(codes::op::OPEN_SESSION, &[DEFAULT_SESSION_ID], None, 0)?;
        }
        if outcome.ok() {
            self.session_id = DEFAULT_SESSION_ID;
            self.transaction_id = 0;
            Ok(())
        } else {
            log::warn!(
                "OpenSession failed: {}",
                self.resolver.label(CodeClass::Response, outcome.response)
            );
            Err(PtpError::Response(outcome.response))
        }
    }

    /// Close the session, best effort. Usually called during teardown when
    /// the transport may already be gone, so failures are only logged.
    pub fn close_session(&mut self) {
        if self.session_id != 0 {
            match self.transact(codes::op::CLOSE_SESSION, &[], None, self.transaction_id + 1) {
                Ok(outcome) if !outcome.ok() => log::warn!(
                    "CloseSession: {}",
                    self.resolver.label(CodeClass::Response, outcome.response)
                ),
                Ok(_) => {}
                Err(e) => log::warn!("CloseSession: {}", e),
            }
        }
        self.session_id = 0;
        self.transaction_id = 0;
    }

    /// Execute one operation with u32 parameters and no outbound data.
    pub fn execute(&mut self, code: u16, params: &[u32]) -> Result<TransactionOutcome> {
        self.execute_with_data(code, params, None)
    }

    /// Execute one operation, optionally sending a data phase.
    ///
    /// Allocates the next transaction id, runs the command, data and
    /// response phases, and returns the outcome. Requires an open session.
    pub fn execute_with_data(
        &mut self,
        code: u16,
        params: &[u32],
        data_out: Option<&[u8]>,
    ) -> Result<TransactionOutcome> {
        if self.session_id == 0 {
            return Err(PtpError::NoSession);
        }
        let tid = self.transaction_id + 1;
        let outcome = self.transact(code, params, data_out, tid)?;
        self.transaction_id = tid;
        Ok(outcome)
    }

    /// Poll the interrupt pipe for a generic PTP event container.
    pub fn poll_interrupt_event(&mut self) -> Result<Option<PtpEvent>> {
        let mut buf = [0u8; 64];
        let n = self.transport.read_event(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let container = protocol::parse_container(&buf[..n])?;
        if container.kind != ContainerKind::Event {
            log::debug!("non-event container on interrupt pipe, ignored");
            return Ok(None);
        }
        log::debug!(
            "event: {}",
            self.resolver.label(CodeClass::Event, container.code)
        );
        Ok(Some(PtpEvent {
            code: container.code,
            params: container.params(),
        }))
    }

    /// One full command/data/response exchange with an explicit transaction
    /// id. `open_session`/`close_session` use id 0 per the PTP spec.
    fn transact(
        &mut self,
        code: u16,
        params: &[u32],
        data_out: Option<&[u8]>,
        tid: u32,
    ) -> Result<TransactionOutcome> {
        log::trace!(
            "[{}] {} {:?}",
            tid,
            self.resolver.label(CodeClass::Operation, code),
            params
        );
        let command = protocol::build_container(ContainerKind::Command, code, tid, params);
        self.transport.write(&command)?;
        if let Some(data) = data_out {
            let container = protocol::build_data_container(code, tid, data);
            self.transport.write(&container)?;
        }

        let mut data_in = Vec::new();
        loop {
            let container = self.read_container()?;
            match container.kind {
                ContainerKind::Data => data_in = container.payload,
                ContainerKind::Response => {
                    self.last_response = container.code;
                    if !container.params().is_empty() {
                        log::trace!("[{}] response params {:?}", tid, container.params());
                    }
                    if container.code != codes::rsp::OK {
                        log::debug!(
                            "[{}] {} -> {}",
                            tid,
                            self.resolver.label(CodeClass::Operation, code),
                            self.resolver.label(CodeClass::Response, container.code)
                        );
                    }
                    return Ok(TransactionOutcome {
                        response: container.code,
                        data: data_in,
                    });
                }
                ContainerKind::Event => {
                    // Events on the bulk pipe mid-transaction are out of
                    // spec; skip and keep waiting for the response phase.
                    log::debug!(
                        "unexpected event {} during transaction",
                        self.resolver.label(CodeClass::Event, container.code)
                    );
                }
                ContainerKind::Command => {
                    return Err(PtpError::Transport(
                        "command container from device".into(),
                    ));
                }
            }
        }
    }

    /// Read one complete container, reassembling transfers when the
    /// announced length exceeds a single bulk read.
    fn read_container(&mut self) -> Result<Container> {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = self.transport.read(&mut buf)?;
        buf.truncate(n);
        let total = protocol::announced_length(&buf)
            .ok_or_else(|| PtpError::Transport(format!("short read: {} bytes", n)))?;
        while buf.len() < total {
            let mut chunk = vec![0u8; READ_CHUNK.min(total - buf.len())];
            let n = self.transport.read(&mut chunk)?;
            if n == 0 {
                return Err(PtpError::Transport("truncated container".into()));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        protocol::parse_container(&buf)
    }
}
