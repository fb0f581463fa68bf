//! Action Pipeline
//!
//! Validates untrusted action requests, queues accepted ones, and applies
//! them to the match one at a time. Lifecycle:
//!
//! ```text
//! Uninitialized --work_start--> Idle <--update--> Processing
//!       ^                         |
//!       +--------work_end---------+
//! ```

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::events::{BusEvent, EventBus};
use crate::core::ids::{ClientId, EntityId};
use crate::game::pathfind::PathStep;

/// Default queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 10;

// =============================================================================
// Requests
// =============================================================================

/// Kinds of action a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Move,
}

/// Move an entity to a target tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    #[serde(rename = "entityID")]
    pub entity_id: EntityId,
    pub target_x: i32,
    pub target_y: i32,
    /// Filled in by validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathStep>,
}

/// A typed action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionRequest {
    Move(MoveRequest),
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Move(_) => ActionKind::Move,
        }
    }

    /// Entity the action is about.
    pub fn entity_id(&self) -> &EntityId {
        match self {
            ActionRequest::Move(request) => &request.entity_id,
        }
    }
}

// =============================================================================
// Handlers and Events
// =============================================================================

/// Per-kind action behavior against a context `C`.
///
/// An action accepted by `validate` must always be executable by
/// `on_start`/`on_end`; there is no execution-time failure path.
pub trait ActionHandler<C>: Send {
    /// Check the request. May attach derived data (e.g. a computed path).
    fn validate(&self, context: &C, request: &mut ActionRequest, sender: &ClientId) -> bool;

    fn on_start(&self, context: &mut C, request: &ActionRequest);

    fn on_end(&self, context: &mut C, request: &ActionRequest);
}

/// Pipeline lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Valid { request: ActionRequest, sender: ClientId },
    Invalid { request: ActionRequest, sender: ClientId },
    Process { request: ActionRequest },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionEventKind {
    Valid,
    Invalid,
    Process,
}

impl BusEvent for ActionEvent {
    type Kind = ActionEventKind;

    fn kind(&self) -> ActionEventKind {
        match self {
            ActionEvent::Valid { .. } => ActionEventKind::Valid,
            ActionEvent::Invalid { .. } => ActionEventKind::Invalid,
            ActionEvent::Process { .. } => ActionEventKind::Process,
        }
    }
}

/// Pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Action type {0:?} has no handler")]
    UnknownActionType(ActionKind),
    #[error("Action type {0:?} is already registered")]
    DuplicateActionType(ActionKind),
    #[error("Action queue is full")]
    QueueFull,
    #[error("Action pipeline is not running")]
    NotRunning,
    #[error("Action was rejected")]
    Rejected,
}

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Idle,
    Processing,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Bounded FIFO of validated actions with a single consumer.
pub struct ActionPipeline<C> {
    state: PipelineState,
    handlers: BTreeMap<ActionKind, Box<dyn ActionHandler<C>>>,
    queue: VecDeque<ActionRequest>,
    current: Option<ActionRequest>,
    max_size: usize,
    events: EventBus<ActionEvent>,
}

impl<C> ActionPipeline<C> {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            handlers: BTreeMap::new(),
            queue: VecDeque::new(),
            current: None,
            max_size,
            events: EventBus::with_channels(&[
                ActionEventKind::Valid,
                ActionEventKind::Invalid,
                ActionEventKind::Process,
            ]),
        }
    }

    /// Install the handler for an action kind.
    pub fn register_action(
        &mut self,
        kind: ActionKind,
        handler: Box<dyn ActionHandler<C>>,
    ) -> Result<(), ActionError> {
        if self.handlers.contains_key(&kind) {
            return Err(ActionError::DuplicateActionType(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Lifecycle event bus.
    pub fn events_mut(&mut self) -> &mut EventBus<ActionEvent> {
        &mut self.events
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != PipelineState::Uninitialized
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Action being executed right now (only observable from handlers' side effects).
    pub fn current_action(&self) -> Option<&ActionRequest> {
        self.current.as_ref()
    }

    pub fn work_start(&mut self) {
        self.state = PipelineState::Idle;
    }

    /// Drop all pending work and stop.
    pub fn work_end(&mut self) {
        self.queue.clear();
        self.current = None;
        self.state = PipelineState::Uninitialized;
    }

    /// Validate a request. Does not queue it.
    ///
    /// Emits `Valid` or `Invalid`. Unknown kinds are rejected without an event.
    pub fn process_request(
        &mut self,
        sender: &ClientId,
        request: &mut ActionRequest,
        context: &C,
    ) -> Result<(), ActionError> {
        let Some(handler) = self.handlers.get(&request.kind()) else {
            warn!("Action type {:?} has no handler", request.kind());
            return Err(ActionError::UnknownActionType(request.kind()));
        };

        if handler.validate(context, request, sender) {
            self.events.emit(&ActionEvent::Valid {
                request: request.clone(),
                sender: sender.clone(),
            });
            Ok(())
        } else {
            self.events.emit(&ActionEvent::Invalid {
                request: request.clone(),
                sender: sender.clone(),
            });
            Err(ActionError::Rejected)
        }
    }

    /// Append to the queue.
    pub fn queue_action(&mut self, request: ActionRequest) -> Result<(), ActionError> {
        self.ensure_capacity()?;
        self.queue.push_back(request);
        Ok(())
    }

    /// Insert at the head of the queue.
    pub fn queue_priority_action(&mut self, request: ActionRequest) -> Result<(), ActionError> {
        self.ensure_capacity()?;
        self.queue.push_front(request);
        Ok(())
    }

    fn ensure_capacity(&self) -> Result<(), ActionError> {
        if self.queue.len() >= self.max_size {
            warn!("Action queue is full ({} entries)", self.queue.len());
            return Err(ActionError::QueueFull);
        }
        Ok(())
    }

    /// Drain the queue, executing each action to completion in order.
    ///
    /// No-op unless idle with pending work. Returns whether anything ran.
    pub fn update(&mut self, context: &mut C) -> bool {
        if self.state != PipelineState::Idle || self.queue.is_empty() {
            return false;
        }

        let pending = self.queue.len();
        for _ in 0..pending {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            self.state = PipelineState::Processing;

            match self.handlers.get(&request.kind()) {
                Some(handler) => {
                    self.events.emit(&ActionEvent::Process {
                        request: request.clone(),
                    });
                    self.current = Some(request.clone());
                    handler.on_start(context, &request);
                    handler.on_end(context, &request);
                    debug!("Processed {:?} action for entity {}", request.kind(), request.entity_id());
                }
                None => warn!("Dropping queued action {:?} without handler", request.kind()),
            }

            self.current = None;
            self.state = PipelineState::Idle;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal {
        lines: Vec<String>,
    }

    struct Recorder;

    impl ActionHandler<Journal> for Recorder {
        fn validate(&self, _: &Journal, request: &mut ActionRequest, _: &ClientId) -> bool {
            let ActionRequest::Move(request) = request;
            if request.target_x < 0 {
                return false;
            }
            request.path = vec![PathStep { delta_x: 1, delta_y: 0 }];
            true
        }

        fn on_start(&self, context: &mut Journal, request: &ActionRequest) {
            context.lines.push(format!("start {}", request.entity_id()));
        }

        fn on_end(&self, context: &mut Journal, request: &ActionRequest) {
            context.lines.push(format!("end {}", request.entity_id()));
        }
    }

    fn request(entity: &str, target_x: i32) -> ActionRequest {
        ActionRequest::Move(MoveRequest {
            entity_id: EntityId::new(entity),
            target_x,
            target_y: 0,
            path: Vec::new(),
        })
    }

    fn pipeline() -> ActionPipeline<Journal> {
        let mut pipeline = ActionPipeline::new(DEFAULT_QUEUE_SIZE);
        pipeline
            .register_action(ActionKind::Move, Box::new(Recorder))
            .unwrap();
        pipeline.work_start();
        pipeline
    }

    #[test]
    fn test_request_wire_format() {
        let parsed: ActionRequest = serde_json::from_str(
            r#"{"type":"MOVE","entityID":"7","targetX":2,"targetY":3}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ActionRequest::Move(MoveRequest {
                entity_id: EntityId::new("7"),
                target_x: 2,
                target_y: 3,
                path: Vec::new(),
            })
        );
    }

    #[test]
    fn test_validate_enriches_request() {
        let mut pipeline = pipeline();
        let mut req = request("1", 2);
        assert!(pipeline
            .process_request(&ClientId::new("c"), &mut req, &Journal::default())
            .is_ok());
        let ActionRequest::Move(inner) = &req;
        assert_eq!(inner.path.len(), 1);
        // Validation never queues.
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_invalid_request_emits_event() {
        let mut pipeline = pipeline();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        pipeline
            .events_mut()
            .subscribe(ActionEventKind::Invalid, "test", move |event| {
                if let ActionEvent::Invalid { sender, .. } = event {
                    sink.lock().unwrap().push(sender.clone());
                }
            });

        let mut req = request("1", -1);
        assert_eq!(
            pipeline.process_request(&ClientId::new("c"), &mut req, &Journal::default()),
            Err(ActionError::Rejected)
        );
        assert_eq!(*seen.lock().unwrap(), vec![ClientId::new("c")]);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut pipeline: ActionPipeline<Journal> = ActionPipeline::new(DEFAULT_QUEUE_SIZE);
        let mut req = request("1", 0);
        assert_eq!(
            pipeline.process_request(&ClientId::new("c"), &mut req, &Journal::default()),
            Err(ActionError::UnknownActionType(ActionKind::Move))
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut pipeline = pipeline();
        assert_eq!(
            pipeline.register_action(ActionKind::Move, Box::new(Recorder)),
            Err(ActionError::DuplicateActionType(ActionKind::Move))
        );
    }

    #[test]
    fn test_update_drains_in_order() {
        let mut pipeline = pipeline();
        let processed = Arc::new(Mutex::new(Vec::new()));
        let sink = processed.clone();
        pipeline
            .events_mut()
            .subscribe(ActionEventKind::Process, "test", move |event| {
                if let ActionEvent::Process { request } = event {
                    sink.lock().unwrap().push(request.entity_id().to_string());
                }
            });

        for id in ["A", "B", "C"] {
            pipeline.queue_action(request(id, 0)).unwrap();
        }

        let mut journal = Journal::default();
        assert!(pipeline.update(&mut journal));

        assert_eq!(*processed.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(
            journal.lines,
            vec!["start A", "end A", "start B", "end B", "start C", "end C"]
        );
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.current_action().is_none());
    }

    #[test]
    fn test_priority_action_jumps_queue() {
        let mut pipeline = pipeline();
        pipeline.queue_action(request("A", 0)).unwrap();
        pipeline.queue_action(request("B", 0)).unwrap();
        pipeline.queue_priority_action(request("P", 0)).unwrap();

        let mut journal = Journal::default();
        pipeline.update(&mut journal);
        assert_eq!(journal.lines[0], "start P");
        assert_eq!(journal.lines[2], "start A");
    }

    #[test]
    fn test_queue_beyond_capacity_rejected() {
        let mut pipeline = pipeline();
        pipeline.set_max_size(2);
        pipeline.queue_action(request("A", 0)).unwrap();
        pipeline.queue_action(request("B", 0)).unwrap();

        assert_eq!(pipeline.queue_action(request("C", 0)), Err(ActionError::QueueFull));
        assert_eq!(
            pipeline.queue_priority_action(request("D", 0)),
            Err(ActionError::QueueFull)
        );
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_update_requires_idle() {
        let mut pipeline: ActionPipeline<Journal> = ActionPipeline::new(DEFAULT_QUEUE_SIZE);
        pipeline
            .register_action(ActionKind::Move, Box::new(Recorder))
            .unwrap();
        pipeline.queue_action(request("A", 0)).unwrap();

        let mut journal = Journal::default();
        assert!(!pipeline.update(&mut journal));
        assert!(journal.lines.is_empty());

        pipeline.work_start();
        assert!(pipeline.update(&mut journal));
        assert!(!pipeline.update(&mut journal));
    }

    #[test]
    fn test_work_end_clears_queue() {
        let mut pipeline = pipeline();
        pipeline.queue_action(request("A", 0)).unwrap();
        pipeline.work_end();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(!pipeline.is_running());
    }
}
