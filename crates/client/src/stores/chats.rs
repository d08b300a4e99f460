//! Chat list and per-chat message cache.
//!
//! The store keeps one immutable [`ChatList`] snapshot behind a `watch`
//! channel. Every mutator reads the current snapshot, builds the next one and
//! publishes it in a single step, so readers never see a half-applied update
//! and a snapshot handed out earlier is never modified afterwards.

use std::sync::Arc;

use chrono::Utc;
use fieldhouse_shared::{Chat, ChatRef, IdGenerator, Message, MessageGroup, MonthKey};
use tokio::sync::watch;

/// How `add_messages` treats ids that are already cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryMerge {
    /// Append every message, duplicates included.
    #[default]
    Append,
    /// Skip messages whose id is already in the chat's group or earlier in the batch.
    DedupeById,
}

/// Input for [`ChatStore::add_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum NewMessage {
    /// Composed locally, not yet confirmed by the server.
    Draft {
        sender_id: String,
        chat_id: String,
        content: String,
    },
    /// Received from the server, with its own id and timestamps.
    Confirmed(Message),
}

/// Immutable snapshot of the chat list. Chats are shared between snapshots
/// until one of them changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatList {
    chats: Vec<Arc<Chat>>,
}

impl ChatList {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chat>> {
        self.chats.iter()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// First chat with this id.
    pub fn get(&self, chat_id: &str) -> Option<&Arc<Chat>> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    fn position(&self, chat_id: &str) -> Option<usize> {
        self.chats.iter().position(|c| c.id == chat_id)
    }

    /// First non-group chat that includes `user_id`.
    pub fn chat_with(&self, user_id: &str) -> Option<&Arc<Chat>> {
        self.chats
            .iter()
            .find(|c| !c.is_group_chat && c.has_user(user_id))
    }

    fn replacing(&self, index: usize, chat: Chat) -> ChatList {
        let mut chats = self.chats.clone();
        chats[index] = Arc::new(chat);
        ChatList { chats }
    }

    fn appending(&self, chat: Chat) -> ChatList {
        let mut chats = self.chats.clone();
        chats.push(Arc::new(chat));
        ChatList { chats }
    }
}

pub struct ChatStore {
    state: watch::Sender<Arc<ChatList>>,
    ids: IdGenerator,
    month_key: MonthKey,
    history_merge: HistoryMerge,
}

impl ChatStore {
    pub fn new(month_key: MonthKey, history_merge: HistoryMerge) -> Self {
        let (state, _) = watch::channel(Arc::new(ChatList::default()));
        Self {
            state,
            ids: IdGenerator::new(),
            month_key,
            history_merge,
        }
    }

    pub fn with_ids(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ChatList> {
        self.state.borrow().clone()
    }

    /// Receive a new snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ChatList>> {
        self.state.subscribe()
    }

    pub fn month_key(&self) -> MonthKey {
        self.month_key
    }

    /// Replace the whole chat list. Every chat starts with an empty message
    /// group and `init == false`, whatever was cached before.
    pub fn set_chats(&self, chats: Vec<Chat>) {
        let count = chats.len();
        let next = ChatList {
            chats: chats.into_iter().map(|c| Arc::new(c.reset())).collect(),
        };
        self.state.send_replace(Arc::new(next));
        crate::log_debug!("chat list replaced ({} chats)", count);
    }

    /// Append a chat. Ids are not checked for collisions.
    pub fn add_chat(&self, chat: Chat) {
        self.state.send_modify(|list| {
            *list = Arc::new(list.appending(chat));
        });
    }

    /// Insert one message into its chat's group.
    ///
    /// Returns the stored message, or `None` when the target chat is not
    /// cached; in that case nothing changes.
    pub fn add_message(&self, input: NewMessage) -> Option<Message> {
        let mut inserted = None;
        self.state.send_if_modified(|list| {
            let chat_id = match &input {
                NewMessage::Draft { chat_id, .. } => chat_id.as_str(),
                NewMessage::Confirmed(message) => message.chat.id.as_str(),
            };
            let Some(index) = list.position(chat_id) else {
                crate::log_warn!("dropping message for unknown chat {}", chat_id);
                return false;
            };
            let current = &list.chats[index];

            let message = match input {
                NewMessage::Draft {
                    sender_id,
                    chat_id,
                    content,
                } => self.draft(current, sender_id, chat_id, content),
                NewMessage::Confirmed(message) => message,
            };

            let mut chat = Chat::clone(current);
            chat.messages = chat.messages.insert(message.clone(), self.month_key);
            chat.touch_preview(&message);

            *list = Arc::new(list.replacing(index, chat));
            inserted = Some(message);
            true
        });
        inserted
    }

    fn draft(&self, chat: &Chat, sender_id: String, chat_id: String, content: String) -> Message {
        let sender = chat.find_user(&sender_id).cloned();
        if sender.is_none() {
            crate::log_debug!("sender {} is not a participant of chat {}", sender_id, chat_id);
        }
        let receivers = chat
            .users
            .iter()
            .filter(|u| u.id != sender_id)
            .map(|u| u.id.clone())
            .collect();
        let now = Utc::now();
        Message {
            id: self.ids.next_id(),
            content,
            sender,
            chat: ChatRef::new(chat_id),
            created_at: now,
            updated_at: Some(now),
            is_read: true,
            read_by: vec![sender_id],
            receivers,
        }
    }

    /// Merge one page of history into a chat and mark it initialised.
    ///
    /// Returns `false` (and changes nothing) when the chat is not cached.
    pub fn add_messages(&self, chat_id: &str, messages: Vec<Message>) -> bool {
        let history_merge = self.history_merge;
        let month_key = self.month_key;
        self.state.send_if_modified(|list| {
            let Some(index) = list.position(chat_id) else {
                crate::log_warn!("dropping history page for unknown chat {}", chat_id);
                return false;
            };

            let mut chat = Chat::clone(&list.chats[index]);
            let mut group = chat.messages.clone();
            let mut newest: Option<Message> = None;
            for message in messages {
                if history_merge == HistoryMerge::DedupeById && group.contains_id(&message.id) {
                    continue;
                }
                if newest
                    .as_ref()
                    .map_or(true, |n| message.created_at >= n.created_at)
                {
                    newest = Some(message.clone());
                }
                group = group.insert(message, month_key);
            }
            chat.messages = group;
            chat.init = true;
            if let Some(newest) = &newest {
                chat.touch_preview(newest);
            }

            *list = Arc::new(list.replacing(index, chat));
            true
        })
    }

    /// First non-group chat that includes `user_id`.
    pub fn get_chat_with(&self, user_id: &str) -> Option<Arc<Chat>> {
        self.state.borrow().chat_with(user_id).cloned()
    }

    /// Chats in list order.
    pub fn chats(&self) -> Vec<Arc<Chat>> {
        self.state.borrow().iter().cloned().collect()
    }

    pub fn chat(&self, chat_id: &str) -> Option<Arc<Chat>> {
        self.state.borrow().get(chat_id).cloned()
    }

    /// The chat's grouped messages. Cloning shares every bucket with the store.
    pub fn messages(&self, chat_id: &str) -> Option<MessageGroup> {
        self.chat(chat_id).map(|c| c.messages.clone())
    }

    pub fn message_count(&self, chat_id: &str) -> usize {
        self.chat(chat_id).map_or(0, |c| c.messages.len())
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new(MonthKey::default(), HistoryMerge::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use fieldhouse_shared::{BucketKey, User};

    fn users(ids: &[&str]) -> Vec<User> {
        ids.iter().map(|id| User::new(*id, id.to_uppercase())).collect()
    }

    fn group_chat(id: &str, members: &[&str]) -> Chat {
        Chat {
            is_group_chat: true,
            chat_name: "Coaches".to_string(),
            ..Chat::direct(id, users(members))
        }
    }

    fn remote(id: &str, chat_id: &str, ts: DateTime<Utc>) -> Message {
        Message {
            id: id.to_string(),
            content: format!("body of {id}"),
            sender: Some(User::new("u2", "U2")),
            chat: ChatRef::new(chat_id),
            created_at: ts,
            updated_at: Some(ts),
            is_read: false,
            read_by: vec![],
            receivers: vec!["u1".to_string()],
        }
    }

    fn store_with(chats: Vec<Chat>) -> ChatStore {
        let store = ChatStore::default();
        store.set_chats(chats);
        store
    }

    #[test]
    fn draft_is_bucketed_and_sender_resolved() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);

        let stored = store
            .add_message(NewMessage::Draft {
                sender_id: "u1".into(),
                chat_id: "A".into(),
                content: "hi".into(),
            })
            .expect("chat A exists");

        let chat = store.chat("A").unwrap();
        assert_eq!(chat.messages.len(), 1);
        let key = BucketKey::for_timestamp(&stored.created_at, MonthKey::ZeroBased);
        let bucket = chat.messages.bucket(&key);
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].content, "hi");
        assert_eq!(bucket[0].sender.as_ref().map(|s| s.id.as_str()), Some("u1"));
        assert_eq!(bucket[0].receivers, ["u2"]);
        assert_eq!(chat.latest_message.as_deref(), Some("hi"));
    }

    #[test]
    fn draft_with_unknown_sender_is_still_inserted() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);

        let stored = store
            .add_message(NewMessage::Draft {
                sender_id: "ghost".into(),
                chat_id: "A".into(),
                content: "boo".into(),
            })
            .unwrap();

        assert!(stored.sender.is_none());
        assert_eq!(store.message_count("A"), 1);
    }

    #[test]
    fn unknown_chat_leaves_store_untouched() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);
        store.add_messages("A", vec![remote("m1", "A", Utc::now())]);
        let before = store.snapshot();
        let rx = store.subscribe();

        let draft = store.add_message(NewMessage::Draft {
            sender_id: "u1".into(),
            chat_id: "missing".into(),
            content: "lost".into(),
        });
        let confirmed = store.add_message(NewMessage::Confirmed(remote("m2", "missing", Utc::now())));

        assert!(draft.is_none());
        assert!(confirmed.is_none());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(*before, *store.snapshot());
        assert!(!rx.has_changed().unwrap());
        assert!(!store.add_messages("missing", vec![remote("m3", "missing", Utc::now())]));
    }

    #[test]
    fn draft_ids_are_unique() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);
        let ids: std::collections::HashSet<String> = (0..50)
            .map(|i| {
                store
                    .add_message(NewMessage::Draft {
                        sender_id: "u1".into(),
                        chat_id: "A".into(),
                        content: format!("msg {i}"),
                    })
                    .unwrap()
                    .id
            })
            .collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(store.message_count("A"), 50);
    }

    #[test]
    fn confirmed_message_goes_to_its_chat() {
        let store = store_with(vec![
            Chat::direct("A", users(&["u1", "u2"])),
            Chat::direct("B", users(&["u1", "u3"])),
        ]);
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();

        store.add_message(NewMessage::Confirmed(remote("m1", "B", ts)));

        assert_eq!(store.message_count("A"), 0);
        let b = store.chat("B").unwrap();
        assert_eq!(b.messages.day("2024", "05", "01")[0].id, "m1");
    }

    #[test]
    fn set_chats_is_destructive() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);
        store.add_messages("A", vec![remote("m1", "A", Utc::now())]);
        assert!(store.chat("A").unwrap().init);

        let mut reloaded = Chat::clone(&store.chat("A").unwrap());
        assert_eq!(reloaded.messages.len(), 1);
        reloaded.chat_name = "renamed".into();
        store.set_chats(vec![reloaded, Chat::direct("B", users(&["u3"]))]);

        for chat in store.snapshot().iter() {
            assert!(chat.messages.is_empty());
            assert!(!chat.init);
        }
        assert_eq!(store.chat("A").unwrap().chat_name, "renamed");
    }

    #[test]
    fn history_merge_appends_duplicates() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 9, 5, 0).unwrap();
        let page = vec![remote("m1", "A", t1), remote("m2", "A", t2)];

        assert!(store.add_messages("A", page.clone()));
        assert!(store.add_messages("A", page));

        let chat = store.chat("A").unwrap();
        assert_eq!(chat.messages.len(), 4);
        assert!(chat.init);
        assert_eq!(chat.latest_message.as_deref(), Some("body of m2"));
    }

    #[test]
    fn history_merge_can_dedupe() {
        let store = ChatStore::new(MonthKey::ZeroBased, HistoryMerge::DedupeById);
        store.set_chats(vec![Chat::direct("A", users(&["u1", "u2"]))]);
        let ts = Utc::now();
        let page = vec![remote("m1", "A", ts), remote("m2", "A", ts), remote("m1", "A", ts)];

        store.add_messages("A", page.clone());
        store.add_messages("A", page);

        assert_eq!(store.message_count("A"), 2);
    }

    #[test]
    fn old_snapshots_are_not_mutated() {
        let store = store_with(vec![Chat::direct("A", users(&["u1", "u2"]))]);
        let before = store.snapshot();

        store.add_message(NewMessage::Draft {
            sender_id: "u1".into(),
            chat_id: "A".into(),
            content: "first".into(),
        });

        assert!(before.get("A").unwrap().messages.is_empty());
        assert_eq!(store.snapshot().get("A").unwrap().messages.len(), 1);
    }

    #[test]
    fn untouched_chats_are_shared_between_snapshots() {
        let store = store_with(vec![
            Chat::direct("A", users(&["u1", "u2"])),
            Chat::direct("B", users(&["u1", "u3"])),
        ]);
        let before = store.snapshot();

        store.add_message(NewMessage::Confirmed(remote("m1", "A", Utc::now())));
        let after = store.snapshot();

        assert!(Arc::ptr_eq(before.get("B").unwrap(), after.get("B").unwrap()));
        assert!(!Arc::ptr_eq(before.get("A").unwrap(), after.get("A").unwrap()));
    }

    #[test]
    fn get_chat_with_skips_group_chats() {
        let store = store_with(vec![
            group_chat("G", &["u1", "u2", "u3"]),
            Chat::direct("A", users(&["u1", "u2"])),
            Chat::direct("B", users(&["u3"])),
        ]);

        assert_eq!(store.get_chat_with("u1").unwrap().id, "A");
        assert_eq!(store.get_chat_with("u3").unwrap().id, "B");
        assert!(store.get_chat_with("u9").is_none());
    }

    #[test]
    fn add_chat_appends_without_checks() {
        let store = store_with(vec![Chat::direct("A", users(&["u1"]))]);
        store.add_chat(Chat::direct("A", users(&["u2"])));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get("A").unwrap().has_user("u1"));
    }

    #[test]
    fn read_helpers_follow_the_current_snapshot() {
        let store = store_with(vec![
            Chat::direct("A", users(&["u1", "u2"])),
            Chat::direct("B", users(&["u1", "u3"])),
        ]);
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        store.add_messages("B", vec![remote("m1", "B", ts), remote("m2", "B", ts)]);

        let ids: Vec<_> = store.chats().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, ["A", "B"]);

        let group = store.messages("B").expect("chat B exists");
        let flat: Vec<_> = group.flatten().into_iter().map(|m| m.id).collect();
        assert_eq!(flat, ["m1", "m2"]);
        assert!(store.messages("A").unwrap().is_empty());
        assert!(store.messages("missing").is_none());

        // Earlier reads are unaffected by later mutations.
        store.add_messages("B", vec![remote("m3", "B", ts)]);
        assert_eq!(group.len(), 2);
        assert_eq!(store.messages("B").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn subscribers_see_each_mutation() {
        let store = store_with(vec![]);
        let mut rx = store.subscribe();

        store.add_chat(Chat::direct("A", users(&["u1", "u2"])));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        store.add_message(NewMessage::Draft {
            sender_id: "u2".into(),
            chat_id: "A".into(),
            content: "yo".into(),
        });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().get("A").unwrap().messages.len(), 1);
    }
}
