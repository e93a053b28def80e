//! Boundary between the bridge and a native messaging engine.
//!
//! # Design
//! - The engine is reached only through [`NativeEngine`]; the bridge never
//!   holds a raw engine pointer outside a session lock.
//! - Notifications are delivered to a [`NativeSink`] passed into `iterate`
//!   instead of a function pointer plus opaque user data.
//! - Arguments stay in their native shape (raw integers, byte slices); all
//!   translation to caller types happens on the bridge side.
//! - Fallible engine operations return `Err(code)` with the engine's raw error
//!   code; the bridge maps that code through the operation's catalogue.

use std::time::Duration;

use toxlink_events::PublicKey;

use crate::options::NativeOptions;

/// Native control values used by engines with legacy file addressing.
pub mod legacy {
    /// Accept an offered transfer or resume a paused one.
    pub const ACCEPT: u8 = 0;
    /// Pause a running transfer.
    pub const PAUSE: u8 = 1;
    /// Abort a transfer.
    pub const KILL: u8 = 2;
    /// Every byte of the transfer was delivered.
    pub const FINISHED: u8 = 3;
    /// Resume a transfer after a broken connection.
    pub const RESUME_BROKEN: u8 = 4;

    /// `receive_send` in a control notification: the slot is one we send on.
    pub const NOTIFY_SENDING: u8 = 1;
    /// `receive_send` in a control notification: the slot is one we receive on.
    pub const NOTIFY_RECEIVING: u8 = 0;
    /// `send_receive` in an outbound control: the slot is one we send on.
    pub const CONTROL_SENDING: u8 = 0;
    /// `send_receive` in an outbound control: the slot is one we receive on.
    pub const CONTROL_RECEIVING: u8 = 1;

    /// Largest data packet a legacy engine accepts per call.
    pub const MAX_CHUNK: u64 = 1371;
}

/// Size in bytes of a full friend address: public key, nospam, checksum.
pub const ADDRESS_SIZE: usize = 38;

/// File numbering used by an engine revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingScheme {
    /// 32-bit bidirectional file numbers; no translation needed.
    Unified,
    /// 8-bit per-direction indices; the bridge keeps a transfer table.
    Legacy,
}

/// Every notification the bridge subscribes to when a session is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Local connection status changes.
    SelfConnectionStatus,
    /// Friend name changes.
    FriendName,
    /// Friend status message changes.
    FriendStatusMessage,
    /// Friend presence changes.
    FriendStatus,
    /// Friend connection status changes.
    FriendConnectionStatus,
    /// Friend typing indicator.
    FriendTyping,
    /// Friend read receipts.
    FriendReadReceipt,
    /// Incoming friend requests.
    FriendRequest,
    /// Incoming friend messages.
    FriendMessage,
    /// Incoming lossy custom packets.
    FriendLossyPacket,
    /// Incoming lossless custom packets.
    FriendLosslessPacket,
    /// Incoming file offers.
    FileRecv,
    /// Remote file control signals.
    FileRecvControl,
    /// Requests for outgoing file chunks.
    FileChunkRequest,
    /// Incoming file chunks.
    FileRecvChunk,
    /// Group peer name changes.
    GroupPeerName,
    /// Group peer presence changes.
    GroupPeerStatus,
    /// Group topic changes.
    GroupTopic,
    /// Group privacy state changes.
    GroupPrivacyState,
    /// Group peer limit changes.
    GroupPeerLimit,
    /// Group password changes.
    GroupPassword,
    /// Group peer list changes.
    GroupPeerlistUpdate,
    /// Group messages.
    GroupMessage,
    /// Group private messages.
    GroupPrivateMessage,
    /// Group invites from friends.
    GroupInvite,
    /// Peers joining a group.
    GroupPeerJoin,
    /// Peers leaving a group.
    GroupPeerExit,
    /// Completed self joins.
    GroupSelfJoin,
    /// Failed joins.
    GroupJoinFail,
    /// Moderation actions.
    GroupModeration,
    /// Legacy incoming file offers.
    LegacyFileSendRequest,
    /// Legacy file control signals in either direction.
    LegacyFileControl,
    /// Legacy incoming file data.
    LegacyFileData,
}

impl NotificationKind {
    /// All kinds, in registration order.
    pub const ALL: [Self; 33] = [
        Self::SelfConnectionStatus,
        Self::FriendName,
        Self::FriendStatusMessage,
        Self::FriendStatus,
        Self::FriendConnectionStatus,
        Self::FriendTyping,
        Self::FriendReadReceipt,
        Self::FriendRequest,
        Self::FriendMessage,
        Self::FriendLossyPacket,
        Self::FriendLosslessPacket,
        Self::FileRecv,
        Self::FileRecvControl,
        Self::FileChunkRequest,
        Self::FileRecvChunk,
        Self::GroupPeerName,
        Self::GroupPeerStatus,
        Self::GroupTopic,
        Self::GroupPrivacyState,
        Self::GroupPeerLimit,
        Self::GroupPassword,
        Self::GroupPeerlistUpdate,
        Self::GroupMessage,
        Self::GroupPrivateMessage,
        Self::GroupInvite,
        Self::GroupPeerJoin,
        Self::GroupPeerExit,
        Self::GroupSelfJoin,
        Self::GroupJoinFail,
        Self::GroupModeration,
        Self::LegacyFileSendRequest,
        Self::LegacyFileControl,
        Self::LegacyFileData,
    ];
}

/// Receiver for engine notifications, invoked synchronously from `iterate`.
///
/// Enumerated arguments arrive as the engine's raw integer values.
pub trait NativeSink {
    /// Local connection status changed.
    fn self_connection_status(&mut self, connection_status: u32);
    /// A friend changed their name.
    fn friend_name(&mut self, friend_number: u32, name: &[u8]);
    /// A friend changed their status message.
    fn friend_status_message(&mut self, friend_number: u32, message: &[u8]);
    /// A friend changed their presence.
    fn friend_status(&mut self, friend_number: u32, status: u32);
    /// A friend's connection status changed.
    fn friend_connection_status(&mut self, friend_number: u32, connection_status: u32);
    /// A friend started or stopped typing.
    fn friend_typing(&mut self, friend_number: u32, is_typing: bool);
    /// A friend acknowledged a message.
    fn friend_read_receipt(&mut self, friend_number: u32, message_id: u32);
    /// A stranger sent a friend request.
    fn friend_request(&mut self, public_key: &PublicKey, message: &[u8]);
    /// A friend sent a message.
    fn friend_message(&mut self, friend_number: u32, message_type: u32, message: &[u8]);
    /// A friend sent a lossy packet.
    fn friend_lossy_packet(&mut self, friend_number: u32, data: &[u8]);
    /// A friend sent a lossless packet.
    fn friend_lossless_packet(&mut self, friend_number: u32, data: &[u8]);
    /// A friend offered a file (unified addressing).
    fn file_recv(
        &mut self,
        friend_number: u32,
        file_number: u32,
        kind: u32,
        file_size: u64,
        filename: &[u8],
    );
    /// A friend sent a file control signal (unified addressing).
    fn file_recv_control(&mut self, friend_number: u32, file_number: u32, control: u32);
    /// The engine wants the next outgoing chunk (unified addressing).
    fn file_chunk_request(&mut self, friend_number: u32, file_number: u32, position: u64, length: u64);
    /// A chunk of an incoming file arrived (unified addressing).
    fn file_recv_chunk(&mut self, friend_number: u32, file_number: u32, position: u64, data: &[u8]);
    /// A group peer changed their name.
    fn group_peer_name(&mut self, group_number: u32, peer_number: u32, name: &[u8]);
    /// A group peer changed their presence.
    fn group_peer_status(&mut self, group_number: u32, peer_number: u32, status: u32);
    /// A group peer changed the topic.
    fn group_topic(&mut self, group_number: u32, peer_number: u32, topic: &[u8]);
    /// The group privacy state changed.
    fn group_privacy_state(&mut self, group_number: u32, privacy_state: u32);
    /// The group peer limit changed.
    fn group_peer_limit(&mut self, group_number: u32, peer_limit: u32);
    /// The group password changed.
    fn group_password(&mut self, group_number: u32, password: &[u8]);
    /// The group peer list changed.
    fn group_peerlist_update(&mut self, group_number: u32);
    /// A group message arrived.
    fn group_message(
        &mut self,
        group_number: u32,
        peer_number: u32,
        message_type: u32,
        message: &[u8],
    );
    /// A private group message arrived.
    fn group_private_message(&mut self, group_number: u32, peer_number: u32, message: &[u8]);
    /// A friend invited us into a group.
    fn group_invite(&mut self, friend_number: u32, invite_data: &[u8]);
    /// A peer joined a group.
    fn group_peer_join(&mut self, group_number: u32, peer_number: u32);
    /// A peer left a group.
    fn group_peer_exit(&mut self, group_number: u32, peer_number: u32, part_message: &[u8]);
    /// We joined a group.
    fn group_self_join(&mut self, group_number: u32);
    /// Joining a group failed.
    fn group_join_fail(&mut self, group_number: u32, fail_type: u32);
    /// A moderator acted on a peer.
    fn group_moderation(
        &mut self,
        group_number: u32,
        source_peer_number: u32,
        target_peer_number: u32,
        mod_event: u32,
    );
    /// A friend offered a file (legacy addressing).
    fn legacy_file_send_request(
        &mut self,
        friend_number: u32,
        file_index: u8,
        file_size: u64,
        filename: &[u8],
    );
    /// A friend sent a file control signal (legacy addressing).
    ///
    /// `receive_send` is [`legacy::NOTIFY_SENDING`] when the slot is one we
    /// send on and [`legacy::NOTIFY_RECEIVING`] when it is one we receive on.
    fn legacy_file_control(&mut self, friend_number: u32, receive_send: u8, file_index: u8, control: u8);
    /// A chunk of an incoming file arrived (legacy addressing).
    fn legacy_file_data(&mut self, friend_number: u32, file_index: u8, data: &[u8]);
}

/// One native engine instance. Not safe for concurrent use; the registry
/// serializes every call.
pub trait NativeEngine: Send {
    /// File numbering this engine uses.
    fn addressing(&self) -> AddressingScheme;
    /// Subscribe to one notification kind.
    fn register(&mut self, kind: NotificationKind);
    /// Run one event-loop step, firing notifications into `sink`.
    fn iterate(&mut self, sink: &mut dyn NativeSink);
    /// Delay the engine wants before the next `iterate`.
    fn iteration_interval(&self) -> Duration;

    /// Size in bytes of the persisted state.
    fn savedata_size(&self) -> usize;
    /// Write the persisted state into `out`, which has `savedata_size` bytes.
    fn savedata(&self, out: &mut [u8]);

    /// Add a bootstrap node.
    ///
    /// # Errors
    ///
    /// Raw `BootstrapError` code.
    fn bootstrap(&mut self, host: &str, port: u16, public_key: &PublicKey) -> Result<(), u32>;
    /// UDP port the node is bound to.
    ///
    /// # Errors
    ///
    /// Raw `GetPortError` code.
    fn udp_port(&self) -> Result<u16, u32>;
    /// Set the local nickname.
    ///
    /// # Errors
    ///
    /// Raw `SetInfoError` code.
    fn set_name(&mut self, name: &[u8]) -> Result<(), u32>;
    /// Size in bytes of the local nickname.
    fn self_name_size(&self) -> usize;
    /// Write the local nickname into `out`, which has `self_name_size` bytes.
    fn self_name(&self, out: &mut [u8]);
    /// Set the local status message.
    ///
    /// # Errors
    ///
    /// Raw `SetInfoError` code.
    fn set_status_message(&mut self, message: &[u8]) -> Result<(), u32>;
    /// Set the local presence from its raw value.
    fn set_status(&mut self, status: u32);
    /// Raw value of the local presence.
    fn status(&self) -> u32;

    /// Send a friend request to a full address.
    ///
    /// # Errors
    ///
    /// Raw `FriendAddError` code.
    fn friend_add(&mut self, address: &[u8; ADDRESS_SIZE], message: &[u8]) -> Result<u32, u32>;
    /// Add a friend without sending a request.
    ///
    /// # Errors
    ///
    /// Raw `FriendAddError` code.
    fn friend_add_norequest(&mut self, public_key: &PublicKey) -> Result<u32, u32>;
    /// Remove a friend.
    ///
    /// # Errors
    ///
    /// Raw `FriendDeleteError` code.
    fn friend_delete(&mut self, friend_number: u32) -> Result<(), u32>;
    /// Look up a friend by public key.
    ///
    /// # Errors
    ///
    /// Raw `FriendByPublicKeyError` code.
    fn friend_by_public_key(&self, public_key: &PublicKey) -> Result<u32, u32>;
    /// Public key of a friend.
    ///
    /// # Errors
    ///
    /// Raw `FriendGetPublicKeyError` code.
    fn friend_public_key(&self, friend_number: u32) -> Result<PublicKey, u32>;
    /// Set our typing indicator for a friend.
    ///
    /// # Errors
    ///
    /// Raw `SetTypingError` code.
    fn set_typing(&mut self, friend_number: u32, is_typing: bool) -> Result<(), u32>;
    /// Send a message, returning its message id.
    ///
    /// # Errors
    ///
    /// Raw `FriendSendMessageError` code.
    fn friend_send_message(
        &mut self,
        friend_number: u32,
        message_type: u32,
        message: &[u8],
    ) -> Result<u32, u32>;
    /// Send a lossless custom packet.
    ///
    /// # Errors
    ///
    /// Raw `FriendCustomPacketError` code.
    fn friend_send_lossless_packet(&mut self, friend_number: u32, data: &[u8]) -> Result<(), u32>;

    /// Offer a file; returns the engine's file number (a send index under
    /// legacy addressing).
    ///
    /// # Errors
    ///
    /// Raw `FileSendError` code.
    fn file_send(
        &mut self,
        friend_number: u32,
        kind: u32,
        file_size: u64,
        filename: &[u8],
    ) -> Result<u32, u32>;
    /// Apply a control to a transfer (unified addressing).
    ///
    /// # Errors
    ///
    /// Raw `FileControlError` code.
    fn file_control(&mut self, friend_number: u32, file_number: u32, control: u32) -> Result<(), u32>;
    /// Send one chunk of an outgoing transfer (unified addressing).
    ///
    /// # Errors
    ///
    /// Raw `FileSendChunkError` code.
    fn file_send_chunk(
        &mut self,
        friend_number: u32,
        file_number: u32,
        position: u64,
        data: &[u8],
    ) -> Result<(), u32>;
    /// Send a legacy control signal.
    ///
    /// `send_receive` is [`legacy::CONTROL_SENDING`] or
    /// [`legacy::CONTROL_RECEIVING`].
    ///
    /// # Errors
    ///
    /// Raw `FileControlError` code.
    fn legacy_file_control(
        &mut self,
        friend_number: u32,
        send_receive: u8,
        file_index: u8,
        control: u8,
    ) -> Result<(), u32>;
    /// Send legacy file data for an outgoing slot.
    ///
    /// # Errors
    ///
    /// Raw `FileSendChunkError` code.
    fn legacy_file_data(&mut self, friend_number: u32, file_index: u8, data: &[u8]) -> Result<(), u32>;

    /// Send a message to a whole group, returning its message id.
    ///
    /// # Errors
    ///
    /// Raw `GroupSendMessageError` code.
    fn group_send_message(
        &mut self,
        group_number: u32,
        message_type: u32,
        message: &[u8],
    ) -> Result<u32, u32>;
    /// Change a group's topic.
    ///
    /// # Errors
    ///
    /// Raw `GroupTopicSetError` code.
    fn group_set_topic(&mut self, group_number: u32, topic: &[u8]) -> Result<(), u32>;
    /// Size in bytes of a group's topic.
    ///
    /// # Errors
    ///
    /// Raw `GroupStateQueriesError` code.
    fn group_topic_size(&self, group_number: u32) -> Result<usize, u32>;
    /// Write a group's topic into `out`, which has `group_topic_size` bytes.
    ///
    /// # Errors
    ///
    /// Raw `GroupStateQueriesError` code.
    fn group_topic(&self, group_number: u32, out: &mut [u8]) -> Result<(), u32>;
    /// Leave a group.
    ///
    /// # Errors
    ///
    /// Raw `GroupLeaveError` code.
    fn group_leave(&mut self, group_number: u32, part_message: &[u8]) -> Result<(), u32>;
}

/// Creates native engine instances.
pub trait EngineFactory: Send + Sync {
    /// Create an engine from validated options.
    ///
    /// # Errors
    ///
    /// Raw `NewError` code.
    fn create(&self, options: &NativeOptions) -> Result<Box<dyn NativeEngine>, u32>;
}
