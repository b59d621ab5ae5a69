//! Module `core`
//!
//! The hub: sole owner of the client registry and the group table. Events are
//! drained from one queue by one task and each handler runs to completion
//! before the next event is read, so handlers may read-then-write shared state
//! without interleaving.
//!
//! Lock order is registry, then group table, then an individual group. Every
//! delivery is a non-blocking mailbox insert; a full mailbox drops the message
//! for that recipient only.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::error::{RelayError, RoutingError, SessionError, handle_error};
use crate::hub::events::{HubEvent, RegisterReply, Refused};
use crate::hub::group::Group;
use crate::hub::registry::ClientRegistry;
use crate::hub::results::DeliveryReport;
use crate::protocol::{Message, PresencePayload};
use crate::session::{Session, SessionId};

/// State shared between the hub task and read-only observers.
#[derive(Default)]
struct HubState {
    clients: RwLock<ClientRegistry>,
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl HubState {
    /// Every registered session plus the presence payload describing them,
    /// captured under the registry and group-table locks together.
    fn snapshot(&self) -> (Vec<Arc<Session>>, PresencePayload) {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);

        let presence = PresencePayload {
            users: clients.names(),
            groups: groups
                .iter()
                .map(|(name, group)| (name.clone(), group.snapshot_members()))
                .collect::<BTreeMap<_, _>>(),
        };
        (clients.sessions(), presence)
    }
}

pub struct Hub {
    state: Arc<HubState>,
    events: mpsc::Receiver<HubEvent>,
}

/// Cloneable entry point to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    state: Arc<HubState>,
}

impl Hub {
    /// Creates a hub with an event queue of `queue_capacity` and a handle to it.
    pub fn new(queue_capacity: usize) -> (Hub, HubHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let state = Arc::new(HubState::default());
        let hub = Hub {
            state: Arc::clone(&state),
            events: rx,
        };
        (hub, HubHandle { events: tx, state })
    }

    /// Drains the event queue until every handle is dropped.
    pub async fn run(mut self) {
        info!("Hub started");
        while let Some(event) = self.events.recv().await {
            debug!("Hub handling {} event", event.label());
            self.handle_event(event);
        }
        info!("Hub stopped: all handles dropped");
    }

    fn handle_event(&self, event: HubEvent) {
        match event {
            HubEvent::Register { session, reply } => {
                let id = session.id();
                let outcome = self.register(session);
                let accepted = outcome.is_ok();
                if reply.send(outcome).is_err() && accepted {
                    // The connection went away while waiting for the answer.
                    self.deregister(&id);
                }
            }
            HubEvent::Deregister(id) => {
                self.deregister(&id);
            }
            HubEvent::Join { session, group } => {
                self.join(&session, &group);
            }
            HubEvent::Leave { session, group } => {
                self.leave(&session, &group);
            }
            HubEvent::Route(message) => {
                if let Err(e) = self.route(message) {
                    handle_error(&RelayError::Routing(e));
                }
            }
        }
    }

    fn register(&self, session: Session) -> RegisterReply {
        {
            let mut clients = self.state.clients.write().unwrap_or_else(PoisonError::into_inner);
            match clients.insert(session) {
                Ok(session) => info!(
                    "Client registered: {} ({}) [{} online]",
                    session.name(),
                    session.id(),
                    clients.len()
                ),
                Err(session) => {
                    let reason = SessionError::NameTaken(session.name().to_string());
                    warn!("Refusing registration of {}: {}", session.id(), reason);
                    return Err(Refused {
                        session: Some(session),
                        reason,
                    });
                }
            }
        }
        self.broadcast_presence();
        Ok(())
    }

    /// Removes the session from every group, then from the registry. Dropping
    /// the registry's handle closes the session's mailbox.
    fn deregister(&self, id: &SessionId) -> bool {
        let memberships: Vec<String> = {
            let groups = self.state.groups.read().unwrap_or_else(PoisonError::into_inner);
            groups
                .values()
                .filter(|group| group.contains(id))
                .map(|group| group.name().to_string())
                .collect()
        };
        for group in &memberships {
            self.remove_from_group(id, group);
        }

        let removed = self
            .state
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        match removed {
            Some(session) => {
                info!(
                    "Client deregistered: {} ({}), left {} group(s)",
                    session.name(),
                    id,
                    memberships.len()
                );
                drop(session);
                self.broadcast_presence();
                true
            }
            None => {
                debug!("Deregister for unknown session {}", id);
                false
            }
        }
    }

    /// Adds the session to `group_name`, creating the group on first join.
    fn join(&self, id: &SessionId, group_name: &str) -> bool {
        let session = {
            let clients = self.state.clients.read().unwrap_or_else(PoisonError::into_inner);
            clients.get(id).cloned()
        };
        let Some(session) = session else {
            warn!("Join of {} by unregistered session {}", group_name, id);
            return false;
        };

        let (added, size) = {
            let mut groups = self.state.groups.write().unwrap_or_else(PoisonError::into_inner);
            let group = groups.entry(group_name.to_string()).or_insert_with(|| {
                info!("Group created: {}", group_name);
                Arc::new(Group::new(group_name))
            });
            (group.add(Arc::clone(&session)), group.len())
        };

        if added {
            info!("{} joined group {} ({} members)", session.name(), group_name, size);
            self.broadcast_presence();
        } else {
            debug!("{} already in group {}", session.name(), group_name);
        }
        added
    }

    fn leave(&self, id: &SessionId, group_name: &str) -> bool {
        let removed = self.remove_from_group(id, group_name);
        if removed {
            self.broadcast_presence();
        } else {
            warn!("Session {} is not a member of group {}", id, group_name);
        }
        removed
    }

    /// Membership removal shared by leave and deregister. Destroys the group
    /// in the same step if it became empty. Does not broadcast presence.
    fn remove_from_group(&self, id: &SessionId, group_name: &str) -> bool {
        let mut groups = self.state.groups.write().unwrap_or_else(PoisonError::into_inner);
        let Some(group) = groups.get(group_name) else {
            return false;
        };

        let removed = group.remove(id);
        if removed {
            debug!("Session {} left group {} ({} remaining)", id, group_name, group.len());
        }
        if group.is_empty() {
            groups.remove(group_name);
            info!("Group {} destroyed: no members left", group_name);
        }
        removed
    }

    /// Delivers a chat message according to its shape: `group` set goes to
    /// the group's members, `recipient` set goes to the recipient and back to
    /// the sender, neither goes to every registered session.
    fn route(&self, message: Message) -> Result<DeliveryReport, RoutingError> {
        if let Some(group_name) = message.group.as_deref() {
            let members = {
                let groups = self.state.groups.read().unwrap_or_else(PoisonError::into_inner);
                match groups.get(group_name) {
                    Some(group) => group.members(),
                    None => return Err(RoutingError::UnknownGroup(group_name.to_string())),
                }
            };
            return Ok(fan_out(&members, &message));
        }

        if let Some(recipient) = message.recipient.as_deref() {
            let targets = {
                let clients = self.state.clients.read().unwrap_or_else(PoisonError::into_inner);
                let Some(target) = clients.find_by_name(recipient) else {
                    return Err(RoutingError::UnknownRecipient(recipient.to_string()));
                };
                let mut targets = vec![Arc::clone(target)];
                if message.sender != recipient {
                    if let Some(sender) = clients.find_by_name(&message.sender) {
                        targets.push(Arc::clone(sender));
                    }
                }
                targets
            };
            return Ok(fan_out(&targets, &message));
        }

        let everyone = self
            .state
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions();
        Ok(fan_out(&everyone, &message))
    }

    fn broadcast_presence(&self) -> DeliveryReport {
        let (sessions, presence) = self.state.snapshot();
        debug!(
            "Broadcasting presence: {} user(s), {} group(s)",
            presence.users.len(),
            presence.groups.len()
        );
        fan_out(&sessions, &Message::presence_update(presence))
    }
}

/// Non-blocking delivery to each session; failures are logged and counted.
fn fan_out(sessions: &[Arc<Session>], message: &Message) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for session in sessions {
        match session.deliver(message.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.dropped += 1;
                handle_error(&RelayError::Routing(e));
            }
        }
    }
    report
}

impl HubHandle {
    /// Asks the hub to register `session` and waits for its answer.
    pub async fn register(&self, session: Session) -> RegisterReply {
        let (reply, answer) = oneshot::channel();
        if let Err(mpsc::error::SendError(event)) =
            self.events.send(HubEvent::Register { session, reply }).await
        {
            let session = match event {
                HubEvent::Register { session, .. } => Some(session),
                _ => None,
            };
            return Err(Refused {
                session,
                reason: SessionError::HubUnavailable,
            });
        }

        answer.await.unwrap_or(Err(Refused {
            session: None,
            reason: SessionError::HubUnavailable,
        }))
    }

    pub async fn deregister(&self, id: SessionId) -> Result<(), SessionError> {
        self.submit(HubEvent::Deregister(id)).await
    }

    pub async fn join(&self, id: SessionId, group: impl Into<String>) -> Result<(), SessionError> {
        self.submit(HubEvent::Join {
            session: id,
            group: group.into(),
        })
        .await
    }

    pub async fn leave(&self, id: SessionId, group: impl Into<String>) -> Result<(), SessionError> {
        self.submit(HubEvent::Leave {
            session: id,
            group: group.into(),
        })
        .await
    }

    pub async fn route(&self, message: Message) -> Result<(), SessionError> {
        self.submit(HubEvent::Route(message)).await
    }

    /// Current presence, read concurrently with the hub's own processing.
    pub fn presence(&self) -> PresencePayload {
        self.state.snapshot().1
    }

    async fn submit(&self, event: HubEvent) -> Result<(), SessionError> {
        self.events
            .send(event)
            .await
            .map_err(|_| SessionError::HubUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;

    struct Peer {
        id: SessionId,
        rx: mpsc::Receiver<Message>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                out.push(message);
            }
            out
        }

        fn drain_chat(&mut self) -> Vec<Message> {
            self.drain()
                .into_iter()
                .filter(|m| m.kind != MessageKind::PresenceUpdate)
                .collect()
        }

        fn last_presence(&mut self) -> Option<PresencePayload> {
            self.drain()
                .into_iter()
                .filter_map(|m| m.presence)
                .last()
        }
    }

    fn hub() -> Hub {
        Hub::new(16).0
    }

    fn login(hub: &Hub, name: &str, capacity: usize) -> Peer {
        let (tx, rx) = mpsc::channel(capacity);
        let id = SessionId::new();
        hub.register(Session::new(id, name, tx)).unwrap();
        Peer { id, rx }
    }

    fn chat(kind: Message, sender: &str) -> Message {
        Message {
            sender: sender.to_string(),
            ..kind
        }
    }

    #[test]
    fn test_register_broadcasts_presence() {
        let hub = hub();
        let mut alice = login(&hub, "alice", 8);
        let mut bob = login(&hub, "bob", 8);

        let presence = alice.last_presence().unwrap();
        assert_eq!(presence.users, vec!["alice", "bob"]);
        assert!(presence.groups.is_empty());
        assert_eq!(bob.last_presence().unwrap().users, vec!["alice", "bob"]);
    }

    #[test]
    fn test_duplicate_name_refused_and_handed_back() {
        let hub = hub();
        let _alice = login(&hub, "alice", 8);

        let (tx, _rx) = mpsc::channel(8);
        let refused = hub
            .register(Session::new(SessionId::new(), "alice", tx))
            .unwrap_err();
        assert_eq!(refused.reason, SessionError::NameTaken("alice".into()));
        assert_eq!(refused.session.unwrap().name(), "alice");
        assert_eq!(hub.state.snapshot().1.users, vec!["alice"]);
    }

    #[test]
    fn test_group_lifecycle() {
        let hub = hub();
        let alice = login(&hub, "alice", 8);
        let bob = login(&hub, "bob", 8);

        assert!(hub.join(&alice.id, "g1"));
        assert!(hub.join(&bob.id, "g1"));
        assert!(!hub.join(&bob.id, "g1"));
        assert_eq!(
            hub.state.snapshot().1.groups.get("g1").unwrap(),
            &vec!["alice".to_string(), "bob".to_string()]
        );

        assert!(hub.leave(&alice.id, "g1"));
        assert!(hub.state.snapshot().1.groups.contains_key("g1"));
        assert!(hub.leave(&bob.id, "g1"));
        assert!(!hub.state.snapshot().1.groups.contains_key("g1"));

        assert!(hub.join(&bob.id, "g1"));
        assert_eq!(hub.state.snapshot().1.groups.get("g1").unwrap(), &vec!["bob".to_string()]);
    }

    #[test]
    fn test_leave_unknown_group_changes_nothing() {
        let hub = hub();
        let mut alice = login(&hub, "alice", 8);
        alice.drain();
        assert!(!hub.leave(&alice.id, "nowhere"));
        assert!(alice.drain().is_empty());
    }

    #[test]
    fn test_join_requires_registration() {
        let hub = hub();
        assert!(!hub.join(&SessionId::new(), "g1"));
        assert!(hub.state.snapshot().1.groups.is_empty());
    }

    #[test]
    fn test_deregister_cleans_groups_and_closes_mailbox() {
        let hub = hub();
        let mut alice = login(&hub, "alice", 8);
        let mut bob = login(&hub, "bob", 8);
        hub.join(&alice.id, "solo");
        hub.join(&alice.id, "shared");
        hub.join(&bob.id, "shared");

        assert!(hub.deregister(&alice.id));
        assert!(!hub.deregister(&alice.id));

        let presence = bob.last_presence().unwrap();
        assert_eq!(presence.users, vec!["bob"]);
        assert!(!presence.groups.contains_key("solo"));
        assert_eq!(presence.groups.get("shared").unwrap(), &vec!["bob".to_string()]);

        alice.drain();
        assert!(matches!(
            alice.rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_presence_matches_state_after_churn() {
        let hub = hub();
        let a = login(&hub, "a", 64);
        let b = login(&hub, "b", 64);
        let mut c = login(&hub, "c", 64);
        hub.join(&a.id, "x");
        hub.join(&b.id, "x");
        hub.join(&b.id, "y");
        hub.join(&c.id, "y");
        hub.leave(&b.id, "x");
        hub.deregister(&a.id);
        hub.join(&c.id, "z");

        let presence = c.last_presence().unwrap();
        assert_eq!(presence.users, vec!["b", "c"]);
        assert_eq!(presence.groups.len(), 2);
        assert_eq!(presence.groups["y"], vec!["b".to_string(), "c".to_string()]);
        assert_eq!(presence.groups["z"], vec!["c".to_string()]);
        assert_eq!(presence, hub.state.snapshot().1);
    }

    #[test]
    fn test_group_message_reaches_only_members() {
        let hub = hub();
        let mut a = login(&hub, "A", 8);
        let mut b = login(&hub, "B", 8);
        let mut c = login(&hub, "C", 8);
        hub.join(&a.id, "g1");
        hub.join(&b.id, "g1");
        a.drain();
        b.drain();
        c.drain();

        let report = hub
            .route(chat(Message::group_text("g1", "hi"), "A"))
            .unwrap();
        assert_eq!(report, DeliveryReport { delivered: 2, dropped: 0 });

        let received = b.drain_chat();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, MessageKind::GroupMessage);
        assert_eq!(received[0].group.as_deref(), Some("g1"));
        assert_eq!(received[0].sender, "A");
        assert_eq!(received[0].text.as_deref(), Some("hi"));
        assert_eq!(a.drain_chat().len(), 1);
        assert!(c.drain().is_empty());
    }

    #[test]
    fn test_private_message_reaches_recipient_and_sender() {
        let hub = hub();
        let mut a = login(&hub, "A", 8);
        let mut b = login(&hub, "B", 8);
        let mut c = login(&hub, "C", 8);

        let report = hub
            .route(chat(Message::private_text("B", "psst"), "A"))
            .unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(a.drain_chat().len(), 1);
        assert_eq!(b.drain_chat().len(), 1);
        assert!(c.drain_chat().is_empty());
    }

    #[test]
    fn test_private_message_to_self_delivered_once() {
        let hub = hub();
        let mut a = login(&hub, "A", 8);
        hub.route(chat(Message::private_text("A", "note"), "A")).unwrap();
        assert_eq!(a.drain_chat().len(), 1);
    }

    #[test]
    fn test_private_message_to_absent_user_is_dropped() {
        let hub = hub();
        let mut a = login(&hub, "A", 8);
        let mut b = login(&hub, "B", 8);
        a.drain();
        b.drain();

        let err = hub
            .route(chat(Message::private_text("ghost", "hello?"), "A"))
            .unwrap_err();
        assert_eq!(err, RoutingError::UnknownRecipient("ghost".into()));
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());

        // The hub keeps working afterwards.
        hub.route(chat(Message::broadcast("still here"), "A")).unwrap();
        assert_eq!(b.drain_chat().len(), 1);
    }

    #[test]
    fn test_group_message_to_missing_group_is_dropped() {
        let hub = hub();
        let _a = login(&hub, "A", 8);
        let err = hub
            .route(chat(Message::group_text("nope", "hi"), "A"))
            .unwrap_err();
        assert_eq!(err, RoutingError::UnknownGroup("nope".into()));
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let hub = hub();
        let mut peers: Vec<Peer> = ["A", "B", "C"].iter().map(|n| login(&hub, n, 8)).collect();
        let report = hub.route(chat(Message::broadcast("all"), "B")).unwrap();
        assert_eq!(report.delivered, 3);
        for peer in &mut peers {
            assert_eq!(peer.drain_chat().len(), 1);
        }
    }

    #[test]
    fn test_full_mailbox_does_not_block_others() {
        let hub = hub();
        let (slow_tx, slow_rx) = mpsc::channel(1);
        let slow_id = SessionId::new();
        hub.register(Session::new(slow_id, "slow", slow_tx.clone()))
            .unwrap();
        let mut slow = Peer { id: slow_id, rx: slow_rx };
        let mut fast = login(&hub, "fast", 16);
        hub.join(&slow.id, "g1");
        hub.join(&fast.id, "g1");
        slow.drain();
        fast.drain();

        slow_tx.try_send(Message::broadcast("backlog")).unwrap();
        let report = hub
            .route(chat(Message::group_text("g1", "hi"), "fast"))
            .unwrap();
        assert_eq!(report, DeliveryReport { delivered: 1, dropped: 1 });
        assert_eq!(fast.drain_chat().len(), 1);

        let queued = slow.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].text.as_deref(), Some("backlog"));
    }

    #[tokio::test]
    async fn test_event_loop_processes_handle_requests_in_order() {
        let (hub, handle) = Hub::new(16);
        let worker = tokio::spawn(hub.run());

        let (tx, mut rx) = mpsc::channel(16);
        let id = SessionId::new();
        handle.register(Session::new(id, "alice", tx)).await.unwrap();
        handle.join(id, "g1").await.unwrap();
        handle.route(chat(Message::group_text("g1", "hi"), "alice")).await.unwrap();
        handle.deregister(id).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(message) = rx.recv().await {
            kinds.push(message.kind);
        }
        assert_eq!(
            kinds,
            vec![
                MessageKind::PresenceUpdate,
                MessageKind::PresenceUpdate,
                MessageKind::GroupMessage
            ]
        );
        assert!(handle.presence().users.is_empty());

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_hub() {
        let (hub, handle) = Hub::new(4);
        drop(hub);
        assert_eq!(
            handle.join(SessionId::new(), "g1").await,
            Err(SessionError::HubUnavailable)
        );

        let (tx, _rx) = mpsc::channel(1);
        let refused = handle
            .register(Session::new(SessionId::new(), "a", tx))
            .await
            .unwrap_err();
        assert_eq!(refused.reason, SessionError::HubUnavailable);
        assert!(refused.session.is_some());
    }
}
