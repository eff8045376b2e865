//! Draft/Activated policy check for mutating operations.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use order_types::{
    domain::{OrderId, OrderStatus},
    protocol::{ChangeEnvelope, OrderChange},
};
use serde::Serialize;
use tracing::info;

use crate::{
    error::PolicyViolation,
    observer::{Observers, SubscriptionToken},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Editable,
    Locked,
}

impl GateState {
    pub fn from_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Draft => GateState::Editable,
            OrderStatus::Activated => GateState::Locked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedOperation {
    AddLine,
    RemoveLine,
    ActivateOrder,
}

impl GatedOperation {
    pub fn locked_message(self) -> &'static str {
        match self {
            GatedOperation::AddLine => "Order is already activated. Cannot add products.",
            GatedOperation::RemoveLine => "Order is already activated. Cannot remove products.",
            GatedOperation::ActivateOrder => "Order is already activated.",
        }
    }
}

impl fmt::Display for GatedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatedOperation::AddLine => f.write_str("add_line"),
            GatedOperation::RemoveLine => f.write_str("remove_line"),
            GatedOperation::ActivateOrder => f.write_str("activate_order"),
        }
    }
}

/// Editable until the order is activated; activation is terminal.
pub struct OrderLifecycleGate {
    order_id: OrderId,
    state: Mutex<GateState>,
    observers: Observers<GateState>,
}

impl OrderLifecycleGate {
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            state: Mutex::new(GateState::from_status(status)),
            observers: Observers::new(),
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn state(&self) -> GateState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_locked(&self) -> bool {
        self.state() == GateState::Locked
    }

    /// Called at the action site, before any remote request is built.
    pub fn check(&self, operation: GatedOperation) -> Result<(), PolicyViolation> {
        match self.state() {
            GateState::Editable => Ok(()),
            GateState::Locked => Err(PolicyViolation::OrderLocked { operation }),
        }
    }

    /// Listeners run once, on the Editable to Locked transition.
    pub fn subscribe(&self, listener: impl Fn(&GateState) + Send + Sync + 'static) -> SubscriptionToken {
        self.observers.subscribe(listener)
    }

    /// Returns true only for the call that performed the transition.
    pub fn lock(&self) -> bool {
        let transitioned = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let transitioned = *state == GateState::Editable;
            *state = GateState::Locked;
            transitioned
        };
        if transitioned {
            info!(order_id = %self.order_id, "order locked");
            self.observers.notify(&GateState::Locked);
        }
        transitioned
    }

    /// A Draft status never unlocks an already locked gate.
    pub fn observe_status(&self, status: OrderStatus) -> bool {
        status.is_activated() && self.lock()
    }

    pub fn observe(&self, envelope: &ChangeEnvelope) -> bool {
        envelope.is_for(&self.order_id)
            && matches!(envelope.change, OrderChange::StatusActivated)
            && self.lock()
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
