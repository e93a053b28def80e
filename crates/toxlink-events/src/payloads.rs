//! Event payload types surfaced to callers after each drain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file_id::FileId;

/// Per-session sequence number assigned to each accumulated event.
pub type EventId = u64;

/// Size in bytes of a peer public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Long-term public key of a peer.
pub type PublicKey = [u8; PUBLIC_KEY_SIZE];

/// Typed notifications raised by the engine while it is being iterated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The local node's connection to the network changed.
    SelfConnectionStatus {
        /// New connection state.
        connection_status: ConnectionStatus,
    },
    /// A friend changed their nickname.
    FriendName {
        /// Friend the update belongs to.
        friend_number: u32,
        /// Raw name bytes.
        name: Vec<u8>,
    },
    /// A friend changed their status message.
    FriendStatusMessage {
        /// Friend the update belongs to.
        friend_number: u32,
        /// Raw status message bytes.
        message: Vec<u8>,
    },
    /// A friend changed their presence.
    FriendStatus {
        /// Friend the update belongs to.
        friend_number: u32,
        /// New presence value.
        status: UserStatus,
    },
    /// A friend went online or offline.
    FriendConnectionStatus {
        /// Friend the update belongs to.
        friend_number: u32,
        /// New connection state.
        connection_status: ConnectionStatus,
    },
    /// A friend started or stopped typing.
    FriendTyping {
        /// Friend the update belongs to.
        friend_number: u32,
        /// Whether the friend is currently typing.
        is_typing: bool,
    },
    /// A friend acknowledged a previously sent message.
    FriendReadReceipt {
        /// Friend the receipt belongs to.
        friend_number: u32,
        /// Message identifier returned by the send operation.
        message_id: u32,
    },
    /// A stranger asked to be added as a friend.
    FriendRequest {
        /// Public key of the requesting peer.
        public_key: PublicKey,
        /// Request message bytes.
        message: Vec<u8>,
    },
    /// A friend sent a text message.
    FriendMessage {
        /// Sending friend.
        friend_number: u32,
        /// Message flavour.
        message_type: MessageType,
        /// Message bytes.
        message: Vec<u8>,
    },
    /// A friend sent a lossy custom packet.
    FriendLossyPacket {
        /// Sending friend.
        friend_number: u32,
        /// Packet payload including the packet id byte.
        data: Vec<u8>,
    },
    /// A friend sent a lossless custom packet.
    FriendLosslessPacket {
        /// Sending friend.
        friend_number: u32,
        /// Packet payload including the packet id byte.
        data: Vec<u8>,
    },
    /// A friend offered a file.
    FileRecv {
        /// Offering friend.
        friend_number: u32,
        /// Unified identifier of the transfer.
        file_number: FileId,
        /// Engine-defined file kind (0 is plain data).
        kind: u32,
        /// Total size in bytes.
        file_size: u64,
        /// Raw filename bytes.
        filename: Vec<u8>,
    },
    /// A friend changed the state of a transfer.
    FileRecvControl {
        /// Friend owning the transfer.
        friend_number: u32,
        /// Unified identifier of the transfer.
        file_number: FileId,
        /// Control signal sent by the friend.
        control: FileControl,
    },
    /// The engine wants the next chunk of an outgoing transfer.
    FileChunkRequest {
        /// Friend receiving the transfer.
        friend_number: u32,
        /// Unified identifier of the transfer.
        file_number: FileId,
        /// Offset of the requested chunk.
        position: u64,
        /// Requested length; zero marks the end of the transfer.
        length: u64,
    },
    /// A chunk of an incoming transfer arrived.
    FileRecvChunk {
        /// Sending friend.
        friend_number: u32,
        /// Unified identifier of the transfer.
        file_number: FileId,
        /// Offset of the chunk.
        position: u64,
        /// Chunk bytes; empty marks the end of the transfer.
        data: Vec<u8>,
    },
    /// A group peer changed their name.
    GroupPeerName {
        /// Group the peer belongs to.
        group_number: u32,
        /// Peer within the group.
        peer_number: u32,
        /// Raw name bytes.
        name: Vec<u8>,
    },
    /// A group peer changed their presence.
    GroupPeerStatus {
        /// Group the peer belongs to.
        group_number: u32,
        /// Peer within the group.
        peer_number: u32,
        /// New presence value.
        status: UserStatus,
    },
    /// A group peer changed the topic.
    GroupTopic {
        /// Group whose topic changed.
        group_number: u32,
        /// Peer that set the topic.
        peer_number: u32,
        /// Raw topic bytes.
        topic: Vec<u8>,
    },
    /// The founder changed the group's privacy state.
    GroupPrivacyState {
        /// Affected group.
        group_number: u32,
        /// New privacy state.
        privacy_state: PrivacyState,
    },
    /// The founder changed the group's peer limit.
    GroupPeerLimit {
        /// Affected group.
        group_number: u32,
        /// New maximum number of peers.
        peer_limit: u32,
    },
    /// The founder changed the group password.
    GroupPassword {
        /// Affected group.
        group_number: u32,
        /// Raw password bytes; empty when the password was removed.
        password: Vec<u8>,
    },
    /// The group peer list changed and should be re-queried.
    GroupPeerlistUpdate {
        /// Affected group.
        group_number: u32,
    },
    /// A group peer sent a message to the whole group.
    GroupMessage {
        /// Group the message was sent to.
        group_number: u32,
        /// Sending peer.
        peer_number: u32,
        /// Message flavour.
        message_type: MessageType,
        /// Message bytes.
        message: Vec<u8>,
    },
    /// A group peer sent a message only to us.
    GroupPrivateMessage {
        /// Group the sender belongs to.
        group_number: u32,
        /// Sending peer.
        peer_number: u32,
        /// Message bytes.
        message: Vec<u8>,
    },
    /// A friend invited us into a group.
    GroupInvite {
        /// Inviting friend.
        friend_number: u32,
        /// Opaque invite payload to pass to the join operation.
        invite_data: Vec<u8>,
    },
    /// A peer joined a group.
    GroupPeerJoin {
        /// Group the peer joined.
        group_number: u32,
        /// Joining peer.
        peer_number: u32,
    },
    /// A peer left a group.
    GroupPeerExit {
        /// Group the peer left.
        group_number: u32,
        /// Leaving peer.
        peer_number: u32,
        /// Parting message bytes.
        part_message: Vec<u8>,
    },
    /// We finished joining a group.
    GroupSelfJoin {
        /// Joined group.
        group_number: u32,
    },
    /// Joining a group failed.
    GroupJoinFail {
        /// Group that could not be joined.
        group_number: u32,
        /// Failure reason.
        fail_type: JoinFail,
    },
    /// A moderator changed a peer's role.
    GroupModeration {
        /// Affected group.
        group_number: u32,
        /// Peer that performed the action.
        source_peer_number: u32,
        /// Peer the action applies to.
        target_peer_number: u32,
        /// Moderation action.
        mod_event: GroupModEvent,
    },
}

impl Event {
    /// Stable discriminator matching the serialized `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SelfConnectionStatus { .. } => "self_connection_status",
            Self::FriendName { .. } => "friend_name",
            Self::FriendStatusMessage { .. } => "friend_status_message",
            Self::FriendStatus { .. } => "friend_status",
            Self::FriendConnectionStatus { .. } => "friend_connection_status",
            Self::FriendTyping { .. } => "friend_typing",
            Self::FriendReadReceipt { .. } => "friend_read_receipt",
            Self::FriendRequest { .. } => "friend_request",
            Self::FriendMessage { .. } => "friend_message",
            Self::FriendLossyPacket { .. } => "friend_lossy_packet",
            Self::FriendLosslessPacket { .. } => "friend_lossless_packet",
            Self::FileRecv { .. } => "file_recv",
            Self::FileRecvControl { .. } => "file_recv_control",
            Self::FileChunkRequest { .. } => "file_chunk_request",
            Self::FileRecvChunk { .. } => "file_recv_chunk",
            Self::GroupPeerName { .. } => "group_peer_name",
            Self::GroupPeerStatus { .. } => "group_peer_status",
            Self::GroupTopic { .. } => "group_topic",
            Self::GroupPrivacyState { .. } => "group_privacy_state",
            Self::GroupPeerLimit { .. } => "group_peer_limit",
            Self::GroupPassword { .. } => "group_password",
            Self::GroupPeerlistUpdate { .. } => "group_peerlist_update",
            Self::GroupMessage { .. } => "group_message",
            Self::GroupPrivateMessage { .. } => "group_private_message",
            Self::GroupInvite { .. } => "group_invite",
            Self::GroupPeerJoin { .. } => "group_peer_join",
            Self::GroupPeerExit { .. } => "group_peer_exit",
            Self::GroupSelfJoin { .. } => "group_self_join",
            Self::GroupJoinFail { .. } => "group_join_fail",
            Self::GroupModeration { .. } => "group_moderation",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the sequence number and
/// the time the callback fired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Per-session sequence number; continues across drains.
    pub seq: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Network connection state of the local node or a friend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Offline.
    None,
    /// Connected through a TCP relay.
    Tcp,
    /// Connected directly over UDP.
    Udp,
}

/// Flavour of a text message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Ordinary chat message.
    Normal,
    /// Emote, as in `/me`.
    Action,
}

/// Presence advertised by a peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Available.
    None,
    /// Away from keyboard.
    Away,
    /// Do not disturb.
    Busy,
}

/// Control signal applied to a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileControl {
    /// Start or continue the transfer.
    Resume,
    /// Pause the transfer.
    Pause,
    /// Abort the transfer.
    Cancel,
}

/// Whether a group is discoverable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyState {
    /// Anyone with the chat id may join.
    Public,
    /// Joining requires a friend invite.
    Private,
}

/// Reason a group join failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JoinFail {
    /// Our nickname is already in use.
    NameTaken,
    /// The group is full.
    PeerLimit,
    /// The supplied password was wrong.
    InvalidPassword,
    /// Any other failure.
    Unknown,
}

/// Role change applied by a moderator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupModEvent {
    /// The peer was kicked.
    Kick,
    /// The peer was banned.
    Ban,
    /// The peer was demoted to observer.
    Observer,
    /// The peer became a regular user.
    User,
    /// The peer was promoted to moderator.
    Moderator,
}
