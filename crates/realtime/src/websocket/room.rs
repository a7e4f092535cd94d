//! Room membership for a single connection
//!
//! A connection sits in at most one room at a time. What happens when a
//! second join is requested is decided by [`RoomPolicy`].

use std::fmt;
use std::str::FromStr;

use dispatch_shared::RoomScope;

use crate::error::{RealtimeError, RealtimeResult};

/// A server-side broadcast group scoped to one resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Room {
    pub scope: RoomScope,
    pub resource_id: String,
}

impl Room {
    pub fn new(scope: RoomScope, resource_id: impl Into<String>) -> Self {
        Self {
            scope,
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.resource_id)
    }
}

/// What to do when `join_room` is called while already in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPolicy {
    /// Refuse the second join without contacting the server
    #[default]
    Reject,
    /// Send the new join and, once acknowledged, forget the previous room
    Replace,
}

impl FromStr for RoomPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(RoomPolicy::Reject),
            "replace" => Ok(RoomPolicy::Replace),
            other => Err(format!("unknown room policy '{other}'")),
        }
    }
}

/// The connection's current room and the join in flight, if any
#[derive(Debug, Default)]
pub struct RoomSlot {
    current: Option<Room>,
    joining: Option<Room>,
}

impl RoomSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `requested` until its join settles
    ///
    /// Only one join may be in flight. Under [`RoomPolicy::Reject`] a recorded
    /// room refuses any further join.
    pub fn reserve(&mut self, policy: RoomPolicy, requested: &Room) -> RealtimeResult<()> {
        if let Some(joining) = &self.joining {
            tracing::debug!(joining = %joining, requested = %requested, "Join already in flight");
            return Err(RealtimeError::JoinInProgress {
                scope: joining.scope,
                resource_id: joining.resource_id.clone(),
            });
        }
        if let (Some(current), RoomPolicy::Reject) = (&self.current, policy) {
            tracing::debug!(
                current = %current,
                requested = %requested,
                "Rejecting second room join"
            );
            return Err(RealtimeError::RoomAlreadyJoined {
                scope: current.scope,
                resource_id: current.resource_id.clone(),
            });
        }
        self.joining = Some(requested.clone());
        Ok(())
    }

    /// Promote the reserved room to membership, returning the room it replaces
    pub fn occupy(&mut self) -> Option<Room> {
        let room = self.joining.take()?;
        let previous = self.current.replace(room);
        if let Some(previous) = &previous {
            tracing::debug!(previous = %previous, "Replaced room membership");
        }
        previous
    }

    /// Give up the reservation after a failed join
    pub fn release(&mut self) {
        if let Some(room) = self.joining.take() {
            tracing::debug!(room = %room, "Released room reservation");
        }
    }

    pub fn vacate(&mut self) -> Option<Room> {
        self.joining = None;
        self.current.take()
    }

    pub fn current(&self) -> Option<&Room> {
        self.current.as_ref()
    }
}
