//! Conversions between native engine values and caller-facing enumerations.
//!
//! Every table is closed: a value the engine documents maps to exactly one
//! caller value, anything else is a contract violation.

use toxlink_core::ContractViolation;
use toxlink_core::engine::legacy;
use toxlink_events::{
    ConnectionStatus, FileControl, GroupModEvent, JoinFail, MessageType, PrivacyState, UserStatus,
};

const fn unknown(kind: &'static str, value: u32) -> ContractViolation {
    ContractViolation::UnknownEnumValue { kind, value }
}

pub(crate) const fn connection_status(value: u32) -> Result<ConnectionStatus, ContractViolation> {
    match value {
        0 => Ok(ConnectionStatus::None),
        1 => Ok(ConnectionStatus::Tcp),
        2 => Ok(ConnectionStatus::Udp),
        _ => Err(unknown("connection_status", value)),
    }
}

pub(crate) const fn user_status(value: u32) -> Result<UserStatus, ContractViolation> {
    match value {
        0 => Ok(UserStatus::None),
        1 => Ok(UserStatus::Away),
        2 => Ok(UserStatus::Busy),
        _ => Err(unknown("user_status", value)),
    }
}

pub(crate) const fn user_status_to_native(status: UserStatus) -> u32 {
    match status {
        UserStatus::None => 0,
        UserStatus::Away => 1,
        UserStatus::Busy => 2,
    }
}

pub(crate) const fn message_type(value: u32) -> Result<MessageType, ContractViolation> {
    match value {
        0 => Ok(MessageType::Normal),
        1 => Ok(MessageType::Action),
        _ => Err(unknown("message_type", value)),
    }
}

pub(crate) const fn message_type_to_native(message_type: MessageType) -> u32 {
    match message_type {
        MessageType::Normal => 0,
        MessageType::Action => 1,
    }
}

pub(crate) const fn file_control(value: u32) -> Result<FileControl, ContractViolation> {
    match value {
        0 => Ok(FileControl::Resume),
        1 => Ok(FileControl::Pause),
        2 => Ok(FileControl::Cancel),
        _ => Err(unknown("file_control", value)),
    }
}

pub(crate) const fn file_control_to_native(control: FileControl) -> u32 {
    match control {
        FileControl::Resume => 0,
        FileControl::Pause => 1,
        FileControl::Cancel => 2,
    }
}

/// Legacy control sent for a caller-side control.
pub(crate) const fn file_control_to_legacy(control: FileControl) -> u8 {
    match control {
        FileControl::Resume => legacy::ACCEPT,
        FileControl::Pause => legacy::PAUSE,
        FileControl::Cancel => legacy::KILL,
    }
}

pub(crate) const fn privacy_state(value: u32) -> Result<PrivacyState, ContractViolation> {
    match value {
        0 => Ok(PrivacyState::Public),
        1 => Ok(PrivacyState::Private),
        _ => Err(unknown("privacy_state", value)),
    }
}

pub(crate) const fn join_fail(value: u32) -> Result<JoinFail, ContractViolation> {
    match value {
        0 => Ok(JoinFail::NameTaken),
        1 => Ok(JoinFail::PeerLimit),
        2 => Ok(JoinFail::InvalidPassword),
        3 => Ok(JoinFail::Unknown),
        _ => Err(unknown("join_fail", value)),
    }
}

pub(crate) const fn group_mod_event(value: u32) -> Result<GroupModEvent, ContractViolation> {
    match value {
        0 => Ok(GroupModEvent::Kick),
        1 => Ok(GroupModEvent::Ban),
        2 => Ok(GroupModEvent::Observer),
        3 => Ok(GroupModEvent::User),
        4 => Ok(GroupModEvent::Moderator),
        _ => Err(unknown("group_mod_event", value)),
    }
}

/// Legacy engines report an empty name or status message as a lone NUL.
pub(crate) fn legacy_text(bytes: &[u8]) -> Vec<u8> {
    if bytes == [0] {
        Vec::new()
    } else {
        bytes.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_values_map_and_round_trip() {
        for status in [UserStatus::None, UserStatus::Away, UserStatus::Busy] {
            assert_eq!(user_status(user_status_to_native(status)), Ok(status));
        }
        for kind in [MessageType::Normal, MessageType::Action] {
            assert_eq!(message_type(message_type_to_native(kind)), Ok(kind));
        }
        for control in [FileControl::Resume, FileControl::Pause, FileControl::Cancel] {
            assert_eq!(file_control(file_control_to_native(control)), Ok(control));
        }
        assert_eq!(connection_status(2), Ok(ConnectionStatus::Udp));
        assert_eq!(privacy_state(1), Ok(PrivacyState::Private));
        assert_eq!(join_fail(3), Ok(JoinFail::Unknown));
        assert_eq!(group_mod_event(4), Ok(GroupModEvent::Moderator));
    }

    #[test]
    fn values_outside_tables_are_contract_violations() {
        assert_eq!(
            connection_status(3),
            Err(ContractViolation::UnknownEnumValue {
                kind: "connection_status",
                value: 3,
            })
        );
        assert!(user_status(3).is_err());
        assert!(message_type(2).is_err());
        assert!(file_control(3).is_err());
        assert!(privacy_state(2).is_err());
        assert!(join_fail(4).is_err());
        assert!(group_mod_event(5).is_err());
    }

    #[test]
    fn caller_controls_map_to_legacy_controls() {
        assert_eq!(file_control_to_legacy(FileControl::Resume), legacy::ACCEPT);
        assert_eq!(file_control_to_legacy(FileControl::Pause), legacy::PAUSE);
        assert_eq!(file_control_to_legacy(FileControl::Cancel), legacy::KILL);
    }

    #[test]
    fn lone_nul_is_empty_text() {
        assert!(legacy_text(&[0]).is_empty());
        assert_eq!(legacy_text(b"alice"), b"alice".to_vec());
        assert!(legacy_text(&[]).is_empty());
    }
}
