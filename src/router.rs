//! Id-keyed routing of tracker records to receivers.
//!
//! `FrameRouter` holds no sockets. It maps protocol ids to connection ids and
//! turns each inbound frame into the list of frames to write. The relay
//! server owns the sockets and is the single caller of every method here.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::ProtocolError;
use crate::protocol::{self, Inbound, Registration, Role, TrackerRecord, DEBUG_SENTINEL};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// One encoded frame to write to one connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub connection: ConnectionId,
    pub frame: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    /// Records whose channel had no open receiver.
    pub dropped: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Routing {
    pub deliveries: Vec<Delivery>,
    pub report: RouteReport,
}

#[derive(Debug, Default)]
pub struct FrameRouter {
    emitters: HashMap<i32, ConnectionId>,
    subscribers: HashMap<i32, ConnectionId>,
    open: HashSet<ConnectionId>,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&mut self, conn: ConnectionId) {
        self.open.insert(conn);
    }

    /// Handle one inbound frame from `from`.
    pub fn handle_message(
        &mut self,
        from: ConnectionId,
        text: &str,
    ) -> Result<Routing, ProtocolError> {
        match protocol::decode_inbound(text)? {
            Inbound::Register(reg) => {
                self.register(from, reg);
                Ok(Routing::default())
            }
            Inbound::Batch(records) => self.route_batch(&records),
        }
    }

    /// Bind `conn` to `reg.id` in the table for its role. Last one wins.
    pub fn register(&mut self, conn: ConnectionId, reg: Registration) {
        self.open.insert(conn);
        let table = match reg.role {
            Role::Emitter => &mut self.emitters,
            Role::Subscriber => &mut self.subscribers,
        };
        if let Some(previous) = table.insert(reg.id, conn) {
            if previous != conn {
                log::warn!(
                    "{} {} re-registered by {} (replacing {})",
                    reg.role,
                    reg.id,
                    conn,
                    previous
                );
                return;
            }
        }
        log::info!("{} {} connected ({})", reg.role, reg.id, conn);
    }

    /// Forward each record alone to the receiver registered for its channel.
    pub fn route_batch(&self, records: &[TrackerRecord]) -> Result<Routing, ProtocolError> {
        let mut routing = Routing::default();
        for record in records {
            match self.open_subscriber(record.channel_id) {
                Some(conn) => {
                    routing.deliveries.push(Delivery {
                        connection: conn,
                        frame: protocol::encode(record)?,
                    });
                    routing.report.delivered += 1;
                }
                None => {
                    log::debug!("no receiver for channel {}; dropped", record.channel_id);
                    routing.report.dropped += 1;
                }
            }
        }
        Ok(routing)
    }

    /// The debug sentinel for every connected receiver, once per connection.
    pub fn broadcast_debug(&self) -> Result<Vec<Delivery>, ProtocolError> {
        let frame = protocol::encode(&DEBUG_SENTINEL)?;
        let targets: BTreeSet<ConnectionId> = self
            .subscribers
            .values()
            .copied()
            .filter(|conn| self.open.contains(conn))
            .collect();
        Ok(targets
            .into_iter()
            .map(|connection| Delivery {
                connection,
                frame: frame.clone(),
            })
            .collect())
    }

    /// Forget `conn` and every table entry that points at it.
    pub fn connection_closed(&mut self, conn: ConnectionId) -> Vec<(Role, i32)> {
        self.open.remove(&conn);
        let mut removed = Vec::new();
        for (role, table) in [
            (Role::Emitter, &mut self.emitters),
            (Role::Subscriber, &mut self.subscribers),
        ] {
            table.retain(|id, entry| {
                if *entry == conn {
                    log::info!("{} {} disconnected ({})", role, id, conn);
                    removed.push((role, *id));
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    pub fn emitter(&self, id: i32) -> Option<ConnectionId> {
        self.emitters.get(&id).copied()
    }

    pub fn subscriber(&self, id: i32) -> Option<ConnectionId> {
        self.subscribers.get(&id).copied()
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn open_subscriber(&self, id: i32) -> Option<ConnectionId> {
        self.subscribers
            .get(&id)
            .copied()
            .filter(|conn| self.open.contains(conn))
    }
}
