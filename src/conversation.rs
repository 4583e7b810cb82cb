use crate::companion::{Companion, ReplyRequest};
use crate::error::{ChatError, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Session-unique, strictly increasing message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Companion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub delivery_state: DeliveryState,
}

/// A user message waiting on its companion reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTicket {
    pub request_id: MessageId,
    pub request: ReplyRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatNotice {
    pub request_id: MessageId,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyUpdate {
    /// The reply was appended under this id.
    Appended(MessageId),
    /// The reply failed; shown once per user message.
    Failed(ChatNotice),
    /// Unknown, already answered, or already reported.
    Ignored,
}

/// Ordered chat log with optimistic user messages.
///
/// Replies are appended in arrival order and matched to their user message by
/// id, never by position or text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    messages: Vec<Message>,
    next_id: u64,
    context_stress_level: Option<u8>,
    #[serde(skip)]
    reported_failures: HashSet<MessageId>,
}

pub const GREETING: &str =
    "Hi, I'm your Cognitive Twin. I noticed your stress levels are a bit high today. Want to talk about it?";

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the log with a delivered companion message.
    pub fn with_greeting(text: &str) -> Self {
        let mut session = Self::new();
        let text = text.trim();
        if !text.is_empty() {
            session.push(text.to_string(), Sender::Companion, DeliveryState::Delivered);
        }
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Latest scan score, forwarded to the companion as context.
    pub fn set_context_stress_level(&mut self, level: Option<u8>) {
        self.context_stress_level = level;
    }

    pub fn context_stress_level(&self) -> Option<u8> {
        self.context_stress_level
    }

    /// Appends a pending user message. Blank text is ignored.
    pub fn send_user_message(&mut self, text: &str) -> Option<ReplyTicket> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let id = self.push(text.to_string(), Sender::User, DeliveryState::Pending);
        debug!(id = id.value(), "user message queued");
        Some(ReplyTicket {
            request_id: id,
            request: ReplyRequest {
                message: text.to_string(),
                context_stress_level: self.context_stress_level,
            },
        })
    }

    pub fn apply_reply(
        &mut self,
        request_id: MessageId,
        outcome: Result<String, ChatError>,
    ) -> ReplyUpdate {
        let Some(index) = self
            .messages
            .iter()
            .position(|message| message.id == request_id && message.sender == Sender::User)
        else {
            warn!(id = request_id.value(), "reply for unknown message");
            return ReplyUpdate::Ignored;
        };
        if self.messages[index].delivery_state == DeliveryState::Delivered {
            return ReplyUpdate::Ignored;
        }

        match outcome {
            Ok(text) => {
                self.messages[index].delivery_state = DeliveryState::Delivered;
                let id = self.push(text, Sender::Companion, DeliveryState::Delivered);
                debug!(request = request_id.value(), reply = id.value(), "reply appended");
                ReplyUpdate::Appended(id)
            }
            Err(err) => {
                if !self.reported_failures.insert(request_id) {
                    return ReplyUpdate::Ignored;
                }
                if err.kind() == FailureKind::Protocol {
                    error!(id = request_id.value(), error = %err, "companion response unusable");
                } else {
                    warn!(id = request_id.value(), error = %err, "companion reply failed");
                }
                ReplyUpdate::Failed(ChatNotice {
                    request_id,
                    kind: err.kind(),
                    message: "Your companion couldn't answer right now.".to_string(),
                })
            }
        }
    }

    fn push(&mut self, text: String, sender: Sender, delivery_state: DeliveryState) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.messages.push(Message {
            id,
            text,
            sender,
            timestamp: Utc::now(),
            delivery_state,
        });
        id
    }
}

#[derive(Debug)]
struct ReplyArrival {
    request_id: MessageId,
    outcome: Result<String, ChatError>,
}

/// Runs companion requests concurrently and feeds replies back as they land.
pub struct ConversationController {
    session: ConversationSession,
    companion: Arc<dyn Companion>,
    in_flight: HashSet<MessageId>,
    arrival_tx: mpsc::UnboundedSender<ReplyArrival>,
    arrival_rx: mpsc::UnboundedReceiver<ReplyArrival>,
}

impl ConversationController {
    pub fn new(companion: Arc<dyn Companion>) -> Self {
        let (arrival_tx, arrival_rx) = mpsc::unbounded_channel();
        Self {
            session: ConversationSession::new(),
            companion,
            in_flight: HashSet::new(),
            arrival_tx,
            arrival_rx,
        }
    }

    pub fn with_session(mut self, session: ConversationSession) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn set_context_stress_level(&mut self, level: Option<u8>) {
        self.session.set_context_stress_level(level);
    }

    pub fn awaiting_replies(&self) -> usize {
        self.in_flight.len()
    }

    /// Echoes the message locally and requests a reply. Blank text does nothing.
    pub fn send(&mut self, text: &str) -> Option<MessageId> {
        let ticket = self.session.send_user_message(text)?;
        let request_id = ticket.request_id;
        let companion = Arc::clone(&self.companion);
        let arrival_tx = self.arrival_tx.clone();
        tokio::spawn(async move {
            let outcome = companion.reply(ticket.request).await;
            let _ = arrival_tx.send(ReplyArrival {
                request_id,
                outcome,
            });
        });
        self.in_flight.insert(request_id);
        info!(id = request_id.value(), "companion request dispatched");
        Some(request_id)
    }

    /// Waits for the next reply to arrive. `None` when nothing is outstanding.
    pub async fn next_update(&mut self) -> Option<ReplyUpdate> {
        if self.in_flight.is_empty() {
            return None;
        }
        let arrival = self.arrival_rx.recv().await?;
        self.in_flight.remove(&arrival.request_id);
        Some(self.session.apply_reply(arrival.request_id, arrival.outcome))
    }
}
