//! Per-operation error kinds and their native code tables.
//!
//! Every fallible engine operation has a closed set of documented failures.
//! Code `0` is success; any code outside the table is a contract violation,
//! never a silent fallback.

use crate::error::ContractViolation;

/// Closed set of documented failures for one engine operation.
pub trait ErrorKind: Copy + std::error::Error + 'static {
    /// Operation name reported in contract violations.
    const OPERATION: &'static str;

    /// Translate a raw engine code; `0` means success.
    ///
    /// # Errors
    ///
    /// Returns [`ContractViolation::UnexpectedErrorCode`] for codes the
    /// operation does not document.
    fn from_native(code: u32) -> Result<Option<Self>, ContractViolation>;

    /// Raw engine code for this kind.
    fn native_code(self) -> u32;
}

/// Declare an operation's error-kind enum together with its native code table.
///
/// The generated type implements [`ErrorKind`], `Display`, and
/// `std::error::Error`.
///
/// ```
/// use toxlink_core::ErrorKind;
///
/// toxlink_core::native_error_kinds! {
///     /// Failures of a hypothetical ping operation.
///     pub enum PingError("ping") {
///         /// Peer unknown.
///         NotFound = 1 => "peer not found",
///     }
/// }
///
/// assert_eq!(PingError::from_native(0), Ok(None));
/// assert_eq!(PingError::from_native(1), Ok(Some(PingError::NotFound)));
/// assert!(PingError::from_native(2).is_err());
/// ```
#[macro_export]
macro_rules! native_error_kinds {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($operation:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $message:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $crate::ErrorKind for $name {
            const OPERATION: &'static str = $operation;

            fn from_native(
                code: u32,
            ) -> ::core::result::Result<::core::option::Option<Self>, $crate::ContractViolation> {
                match code {
                    0 => Ok(None),
                    $( $code => Ok(Some(Self::$variant)), )+
                    _ => Err($crate::ContractViolation::UnexpectedErrorCode {
                        operation: $operation,
                        code,
                    }),
                }
            }

            fn native_code(self) -> u32 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                formatter.write_str(match self {
                    $( Self::$variant => $message, )+
                })
            }
        }

        impl ::std::error::Error for $name {}
    };
}

native_error_kinds! {
    /// Failures creating an engine instance.
    pub enum NewError("new") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// The engine could not allocate memory.
        Malloc = 2 => "out of memory",
        /// No port in the requested range could be bound.
        PortAlloc = 3 => "port allocation failed",
        /// Unknown proxy type.
        ProxyBadType = 4 => "invalid proxy type",
        /// Proxy host could not be parsed.
        ProxyBadHost = 5 => "invalid proxy host",
        /// Proxy port was zero.
        ProxyBadPort = 6 => "invalid proxy port",
        /// Proxy host could not be resolved.
        ProxyNotFound = 7 => "proxy not found",
        /// Save data is encrypted.
        LoadEncrypted = 8 => "save data is encrypted",
        /// Save data could not be parsed.
        LoadBadFormat = 9 => "save data is malformed",
    }
}

native_error_kinds! {
    /// Failures adding a bootstrap node.
    pub enum BootstrapError("bootstrap") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// Host could not be resolved.
        BadHost = 2 => "invalid bootstrap host",
        /// Port was zero.
        BadPort = 3 => "invalid bootstrap port",
    }
}

native_error_kinds! {
    /// Failures setting the local name or status message.
    pub enum SetInfoError("set_info") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// Value exceeds the engine's limit.
        TooLong = 2 => "value too long",
    }
}

native_error_kinds! {
    /// Failures reading the bound port.
    pub enum GetPortError("get_port") {
        /// The node is not bound to a port.
        NotBound = 1 => "port not bound",
    }
}

native_error_kinds! {
    /// Failures adding a friend.
    pub enum FriendAddError("friend_add") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// Request message too long.
        TooLong = 2 => "message too long",
        /// Request message empty.
        NoMessage = 3 => "message empty",
        /// Address is our own.
        OwnKey = 4 => "cannot add own key",
        /// A request was already sent or the friend is already added.
        AlreadySent = 5 => "friend request already sent",
        /// Address checksum mismatch.
        BadChecksum = 6 => "address checksum mismatch",
        /// Friend is known with a different nospam value.
        SetNewNospam = 7 => "friend nospam changed",
        /// The engine could not allocate memory.
        Malloc = 8 => "out of memory",
    }
}

native_error_kinds! {
    /// Failures removing a friend.
    pub enum FriendDeleteError("friend_delete") {
        /// No such friend.
        FriendNotFound = 1 => "friend not found",
    }
}

native_error_kinds! {
    /// Failures looking up a friend by key.
    pub enum FriendByPublicKeyError("friend_by_public_key") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// No friend has that key.
        NotFound = 2 => "friend not found",
    }
}

native_error_kinds! {
    /// Failures reading a friend's public key.
    pub enum FriendGetPublicKeyError("friend_get_public_key") {
        /// No such friend.
        FriendNotFound = 1 => "friend not found",
    }
}

native_error_kinds! {
    /// Failures setting the typing indicator.
    pub enum SetTypingError("set_typing") {
        /// No such friend.
        FriendNotFound = 1 => "friend not found",
    }
}

native_error_kinds! {
    /// Failures sending a friend message.
    pub enum FriendSendMessageError("friend_send_message") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// No such friend.
        FriendNotFound = 2 => "friend not found",
        /// Friend is offline.
        FriendNotConnected = 3 => "friend not connected",
        /// Send queue allocation failed.
        Sendq = 4 => "send queue full",
        /// Message too long.
        TooLong = 5 => "message too long",
        /// Message empty.
        Empty = 6 => "message empty",
    }
}

native_error_kinds! {
    /// Failures sending a custom packet.
    pub enum FriendCustomPacketError("friend_custom_packet") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// No such friend.
        FriendNotFound = 2 => "friend not found",
        /// Friend is offline.
        FriendNotConnected = 3 => "friend not connected",
        /// First byte is outside the allowed packet id range.
        Invalid = 4 => "invalid packet id",
        /// Packet empty.
        Empty = 5 => "packet empty",
        /// Packet too long.
        TooLong = 6 => "packet too long",
        /// Send queue allocation failed.
        Sendq = 7 => "send queue full",
    }
}

native_error_kinds! {
    /// Failures applying a file control.
    pub enum FileControlError("file_control") {
        /// No such friend.
        FriendNotFound = 1 => "friend not found",
        /// Friend is offline.
        FriendNotConnected = 2 => "friend not connected",
        /// No such transfer.
        NotFound = 3 => "file transfer not found",
        /// Resume requested on a transfer that is not paused.
        NotPaused = 4 => "file transfer not paused",
        /// Transfer was paused by the other side.
        Denied = 5 => "file transfer paused by peer",
        /// Pause requested on a transfer that is already paused.
        AlreadyPaused = 6 => "file transfer already paused",
        /// Send queue allocation failed.
        Sendq = 7 => "send queue full",
    }
}

native_error_kinds! {
    /// Failures offering a file.
    pub enum FileSendError("file_send") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// No such friend.
        FriendNotFound = 2 => "friend not found",
        /// Friend is offline.
        FriendNotConnected = 3 => "friend not connected",
        /// Filename too long.
        NameTooLong = 4 => "filename too long",
        /// Too many concurrent transfers to this friend.
        TooMany = 5 => "too many file transfers",
    }
}

native_error_kinds! {
    /// Failures sending a file chunk.
    pub enum FileSendChunkError("file_send_chunk") {
        /// A required argument was missing.
        Null = 1 => "missing argument",
        /// No such friend.
        FriendNotFound = 2 => "friend not found",
        /// Friend is offline.
        FriendNotConnected = 3 => "friend not connected",
        /// No such transfer.
        NotFound = 4 => "file transfer not found",
        /// Transfer is not running.
        NotTransferring = 5 => "file transfer not running",
        /// Chunk length does not match what was requested.
        InvalidLength = 6 => "invalid chunk length",
        /// Send queue allocation failed.
        Sendq = 7 => "send queue full",
        /// Chunk position does not match the transfer position.
        WrongPosition = 8 => "wrong chunk position",
    }
}

native_error_kinds! {
    /// Failures sending a group message.
    pub enum GroupSendMessageError("group_send_message") {
        /// No such group.
        GroupNotFound = 1 => "group not found",
        /// Message too long.
        TooLong = 2 => "message too long",
        /// Message empty.
        Empty = 3 => "message empty",
        /// Unknown message type.
        BadType = 4 => "invalid message type",
        /// We may not speak in this group.
        Permissions = 5 => "insufficient permissions",
        /// Packet could not be sent.
        FailSend = 6 => "send failed",
    }
}

native_error_kinds! {
    /// Failures setting a group topic.
    pub enum GroupTopicSetError("group_topic_set") {
        /// No such group.
        GroupNotFound = 1 => "group not found",
        /// Topic too long.
        TooLong = 2 => "topic too long",
        /// We may not set the topic.
        Permissions = 3 => "insufficient permissions",
        /// Packet could not be sent.
        FailSend = 4 => "send failed",
    }
}

native_error_kinds! {
    /// Failures leaving a group.
    pub enum GroupLeaveError("group_leave") {
        /// No such group.
        GroupNotFound = 1 => "group not found",
        /// Parting message too long.
        TooLong = 2 => "parting message too long",
        /// Parting packet could not be sent.
        FailSend = 3 => "send failed",
        /// Group state could not be removed.
        DeleteFail = 4 => "group deletion failed",
    }
}

native_error_kinds! {
    /// Failures reading group state.
    pub enum GroupStateQueriesError("group_state_queries") {
        /// No such group.
        GroupNotFound = 1 => "group not found",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_success() {
        assert_eq!(NewError::from_native(0), Ok(None));
        assert_eq!(FileSendChunkError::from_native(0), Ok(None));
    }

    #[test]
    fn documented_codes_round_trip() {
        for kind in [
            FileSendChunkError::NotFound,
            FileSendChunkError::InvalidLength,
            FileSendChunkError::WrongPosition,
        ] {
            assert_eq!(
                FileSendChunkError::from_native(kind.native_code()),
                Ok(Some(kind))
            );
        }
    }

    #[test]
    fn unknown_code_is_contract_violation() {
        assert_eq!(
            BootstrapError::from_native(4),
            Err(ContractViolation::UnexpectedErrorCode {
                operation: "bootstrap",
                code: 4,
            })
        );
        assert_eq!(
            GetPortError::from_native(u32::MAX),
            Err(ContractViolation::UnexpectedErrorCode {
                operation: GetPortError::OPERATION,
                code: u32::MAX,
            })
        );
    }

    #[test]
    fn display_uses_catalogue_message() {
        assert_eq!(NewError::LoadEncrypted.to_string(), "save data is encrypted");
        assert_eq!(
            FriendSendMessageError::FriendNotConnected.to_string(),
            "friend not connected"
        );
    }
}
