//! Translation of native notifications into caller events.
//!
//! # Design
//! - One adapter is built per `iterate` (or `invoke`) under the session lock
//!   and dropped before the lock is released.
//! - The first contract violation is kept and every later callback of the same
//!   pass is ignored; the session is poisoned once the pass returns.
//! - File notifications for engines with legacy addressing are routed through
//!   the transfer table; the other scheme's notifications are violations.

use toxlink_core::{ContractViolation, Handle};
use toxlink_core::engine::NativeSink;
use toxlink_events::{Event, EventAccumulator, FileId, PublicKey};
use tracing::trace;

use crate::convert;
use crate::transfer::TransferTable;

pub(crate) struct CallbackAdapter<'a> {
    handle: Handle,
    events: &'a mut EventAccumulator,
    transfers: Option<&'a mut TransferTable>,
    fault: Option<ContractViolation>,
}

impl<'a> CallbackAdapter<'a> {
    pub(crate) const fn new(
        handle: Handle,
        events: &'a mut EventAccumulator,
        transfers: Option<&'a mut TransferTable>,
    ) -> Self {
        Self {
            handle,
            events,
            transfers,
            fault: None,
        }
    }

    /// First violation raised during the pass, if any.
    pub(crate) fn finish(self) -> Result<(), ContractViolation> {
        self.fault.map_or(Ok(()), Err)
    }

    const fn active(&self) -> bool {
        self.fault.is_none()
    }

    const fn is_legacy(&self) -> bool {
        self.transfers.is_some()
    }

    fn record(&mut self, event: Result<Event, ContractViolation>) {
        match event {
            Ok(event) => {
                self.events.push(event);
            }
            Err(violation) => self.fault = Some(violation),
        }
    }

    fn record_all(&mut self, events: Result<Vec<Event>, ContractViolation>) {
        match events {
            Ok(events) => {
                for event in events {
                    self.events.push(event);
                }
            }
            Err(violation) => self.fault = Some(violation),
        }
    }

    fn text(&self, bytes: &[u8]) -> Vec<u8> {
        if self.is_legacy() {
            convert::legacy_text(bytes)
        } else {
            bytes.to_vec()
        }
    }

    fn unified_only(&mut self, notification: &'static str) -> bool {
        if self.is_legacy() {
            self.fault = Some(ContractViolation::AddressingMismatch { notification });
            return false;
        }
        true
    }
}

impl NativeSink for CallbackAdapter<'_> {
    fn self_connection_status(&mut self, connection_status: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, connection_status, "self_connection_status");
        self.record(
            convert::connection_status(connection_status)
                .map(|connection_status| Event::SelfConnectionStatus { connection_status }),
        );
    }

    fn friend_name(&mut self, friend_number: u32, name: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, len = name.len(), "friend_name");
        let name = self.text(name);
        self.record(Ok(Event::FriendName {
            friend_number,
            name,
        }));
    }

    fn friend_status_message(&mut self, friend_number: u32, message: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, len = message.len(), "friend_status_message");
        let message = self.text(message);
        self.record(Ok(Event::FriendStatusMessage {
            friend_number,
            message,
        }));
    }

    fn friend_status(&mut self, friend_number: u32, status: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, status, "friend_status");
        self.record(
            convert::user_status(status).map(|status| Event::FriendStatus {
                friend_number,
                status,
            }),
        );
    }

    fn friend_connection_status(&mut self, friend_number: u32, connection_status: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, connection_status, "friend_connection_status");
        self.record(convert::connection_status(connection_status).map(|connection_status| {
            Event::FriendConnectionStatus {
                friend_number,
                connection_status,
            }
        }));
    }

    fn friend_typing(&mut self, friend_number: u32, is_typing: bool) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, is_typing, "friend_typing");
        self.record(Ok(Event::FriendTyping {
            friend_number,
            is_typing,
        }));
    }

    fn friend_read_receipt(&mut self, friend_number: u32, message_id: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, message_id, "friend_read_receipt");
        self.record(Ok(Event::FriendReadReceipt {
            friend_number,
            message_id,
        }));
    }

    fn friend_request(&mut self, public_key: &PublicKey, message: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, len = message.len(), "friend_request");
        self.record(Ok(Event::FriendRequest {
            public_key: *public_key,
            message: message.to_vec(),
        }));
    }

    fn friend_message(&mut self, friend_number: u32, message_type: u32, message: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, message_type, len = message.len(), "friend_message");
        self.record(convert::message_type(message_type).map(|message_type| {
            Event::FriendMessage {
                friend_number,
                message_type,
                message: message.to_vec(),
            }
        }));
    }

    fn friend_lossy_packet(&mut self, friend_number: u32, data: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, len = data.len(), "friend_lossy_packet");
        self.record(Ok(Event::FriendLossyPacket {
            friend_number,
            data: data.to_vec(),
        }));
    }

    fn friend_lossless_packet(&mut self, friend_number: u32, data: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, len = data.len(), "friend_lossless_packet");
        self.record(Ok(Event::FriendLosslessPacket {
            friend_number,
            data: data.to_vec(),
        }));
    }

    fn file_recv(
        &mut self,
        friend_number: u32,
        file_number: u32,
        kind: u32,
        file_size: u64,
        filename: &[u8],
    ) {
        if !self.active() || !self.unified_only("file_recv") {
            return;
        }
        trace!(handle = %self.handle, friend_number, file_id = file_number, kind, file_size, "file_recv");
        self.record(Ok(Event::FileRecv {
            friend_number,
            file_number: FileId::from_raw(file_number),
            kind,
            file_size,
            filename: filename.to_vec(),
        }));
    }

    fn file_recv_control(&mut self, friend_number: u32, file_number: u32, control: u32) {
        if !self.active() || !self.unified_only("file_recv_control") {
            return;
        }
        trace!(handle = %self.handle, friend_number, file_id = file_number, control, "file_recv_control");
        self.record(
            convert::file_control(control).map(|control| Event::FileRecvControl {
                friend_number,
                file_number: FileId::from_raw(file_number),
                control,
            }),
        );
    }

    fn file_chunk_request(&mut self, friend_number: u32, file_number: u32, position: u64, length: u64) {
        if !self.active() || !self.unified_only("file_chunk_request") {
            return;
        }
        trace!(handle = %self.handle, friend_number, file_id = file_number, position, length, "file_chunk_request");
        self.record(Ok(Event::FileChunkRequest {
            friend_number,
            file_number: FileId::from_raw(file_number),
            position,
            length,
        }));
    }

    fn file_recv_chunk(&mut self, friend_number: u32, file_number: u32, position: u64, data: &[u8]) {
        if !self.active() || !self.unified_only("file_recv_chunk") {
            return;
        }
        trace!(handle = %self.handle, friend_number, file_id = file_number, position, len = data.len(), "file_recv_chunk");
        self.record(Ok(Event::FileRecvChunk {
            friend_number,
            file_number: FileId::from_raw(file_number),
            position,
            data: data.to_vec(),
        }));
    }

    fn group_peer_name(&mut self, group_number: u32, peer_number: u32, name: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, len = name.len(), "group_peer_name");
        self.record(Ok(Event::GroupPeerName {
            group_number,
            peer_number,
            name: name.to_vec(),
        }));
    }

    fn group_peer_status(&mut self, group_number: u32, peer_number: u32, status: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, status, "group_peer_status");
        self.record(
            convert::user_status(status).map(|status| Event::GroupPeerStatus {
                group_number,
                peer_number,
                status,
            }),
        );
    }

    fn group_topic(&mut self, group_number: u32, peer_number: u32, topic: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, len = topic.len(), "group_topic");
        self.record(Ok(Event::GroupTopic {
            group_number,
            peer_number,
            topic: topic.to_vec(),
        }));
    }

    fn group_privacy_state(&mut self, group_number: u32, privacy_state: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, privacy_state, "group_privacy_state");
        self.record(convert::privacy_state(privacy_state).map(|privacy_state| {
            Event::GroupPrivacyState {
                group_number,
                privacy_state,
            }
        }));
    }

    fn group_peer_limit(&mut self, group_number: u32, peer_limit: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_limit, "group_peer_limit");
        self.record(Ok(Event::GroupPeerLimit {
            group_number,
            peer_limit,
        }));
    }

    fn group_password(&mut self, group_number: u32, password: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, len = password.len(), "group_password");
        self.record(Ok(Event::GroupPassword {
            group_number,
            password: password.to_vec(),
        }));
    }

    fn group_peerlist_update(&mut self, group_number: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, "group_peerlist_update");
        self.record(Ok(Event::GroupPeerlistUpdate { group_number }));
    }

    fn group_message(
        &mut self,
        group_number: u32,
        peer_number: u32,
        message_type: u32,
        message: &[u8],
    ) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, message_type, len = message.len(), "group_message");
        self.record(convert::message_type(message_type).map(|message_type| {
            Event::GroupMessage {
                group_number,
                peer_number,
                message_type,
                message: message.to_vec(),
            }
        }));
    }

    fn group_private_message(&mut self, group_number: u32, peer_number: u32, message: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, len = message.len(), "group_private_message");
        self.record(Ok(Event::GroupPrivateMessage {
            group_number,
            peer_number,
            message: message.to_vec(),
        }));
    }

    fn group_invite(&mut self, friend_number: u32, invite_data: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, len = invite_data.len(), "group_invite");
        self.record(Ok(Event::GroupInvite {
            friend_number,
            invite_data: invite_data.to_vec(),
        }));
    }

    fn group_peer_join(&mut self, group_number: u32, peer_number: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, "group_peer_join");
        self.record(Ok(Event::GroupPeerJoin {
            group_number,
            peer_number,
        }));
    }

    fn group_peer_exit(&mut self, group_number: u32, peer_number: u32, part_message: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, peer_number, "group_peer_exit");
        self.record(Ok(Event::GroupPeerExit {
            group_number,
            peer_number,
            part_message: part_message.to_vec(),
        }));
    }

    fn group_self_join(&mut self, group_number: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, "group_self_join");
        self.record(Ok(Event::GroupSelfJoin { group_number }));
    }

    fn group_join_fail(&mut self, group_number: u32, fail_type: u32) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, group_number, fail_type, "group_join_fail");
        self.record(
            convert::join_fail(fail_type).map(|fail_type| Event::GroupJoinFail {
                group_number,
                fail_type,
            }),
        );
    }

    fn group_moderation(
        &mut self,
        group_number: u32,
        source_peer_number: u32,
        target_peer_number: u32,
        mod_event: u32,
    ) {
        if !self.active() {
            return;
        }
        trace!(
            handle = %self.handle,
            group_number,
            source_peer_number,
            target_peer_number,
            mod_event,
            "group_moderation"
        );
        self.record(convert::group_mod_event(mod_event).map(|mod_event| {
            Event::GroupModeration {
                group_number,
                source_peer_number,
                target_peer_number,
                mod_event,
            }
        }));
    }

    fn legacy_file_send_request(
        &mut self,
        friend_number: u32,
        file_index: u8,
        file_size: u64,
        filename: &[u8],
    ) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, file_index, file_size, "legacy_file_send_request");
        let event = match self.transfers.as_deref_mut() {
            Some(table) => table.remote_offer(friend_number, file_index, file_size, filename),
            None => Err(ContractViolation::AddressingMismatch {
                notification: "legacy_file_send_request",
            }),
        };
        self.record(event);
    }

    fn legacy_file_control(&mut self, friend_number: u32, receive_send: u8, file_index: u8, control: u8) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, receive_send, file_index, control, "legacy_file_control");
        let event = match self.transfers.as_deref_mut() {
            Some(table) => table.remote_control(friend_number, receive_send, file_index, control),
            None => Err(ContractViolation::AddressingMismatch {
                notification: "legacy_file_control",
            }),
        };
        self.record(event);
    }

    fn legacy_file_data(&mut self, friend_number: u32, file_index: u8, data: &[u8]) {
        if !self.active() {
            return;
        }
        trace!(handle = %self.handle, friend_number, file_index, len = data.len(), "legacy_file_data");
        let events = match self.transfers.as_deref_mut() {
            Some(table) => table.remote_data(friend_number, file_index, data),
            None => Err(ContractViolation::AddressingMismatch {
                notification: "legacy_file_data",
            }),
        };
        self.record_all(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toxlink_core::engine::legacy;
    use toxlink_events::{ConnectionStatus, FileDirection, MessageType};

    fn handle() -> Handle {
        Handle::new(0, 1)
    }

    #[test]
    fn callbacks_append_in_order() -> anyhow::Result<()> {
        let mut events = EventAccumulator::new();
        let mut adapter = CallbackAdapter::new(handle(), &mut events, None);
        adapter.self_connection_status(2);
        adapter.friend_message(3, 1, b"waves");
        adapter.finish()?;

        let drained = events.drain().into_events();
        assert_eq!(
            drained,
            vec![
                Event::SelfConnectionStatus {
                    connection_status: ConnectionStatus::Udp,
                },
                Event::FriendMessage {
                    friend_number: 3,
                    message_type: MessageType::Action,
                    message: b"waves".to_vec(),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn first_violation_stops_the_pass() {
        let mut events = EventAccumulator::new();
        let mut adapter = CallbackAdapter::new(handle(), &mut events, None);
        adapter.friend_typing(1, true);
        adapter.friend_status(1, 7);
        adapter.friend_typing(1, false);
        assert_eq!(
            adapter.finish(),
            Err(ContractViolation::UnknownEnumValue {
                kind: "user_status",
                value: 7,
            })
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn legacy_notification_without_table_is_mismatch() {
        let mut events = EventAccumulator::new();
        let mut adapter = CallbackAdapter::new(handle(), &mut events, None);
        adapter.legacy_file_data(1, 0, b"x");
        assert_eq!(
            adapter.finish(),
            Err(ContractViolation::AddressingMismatch {
                notification: "legacy_file_data",
            })
        );
    }

    #[test]
    fn unified_notification_with_table_is_mismatch() {
        let mut events = EventAccumulator::new();
        let mut table = TransferTable::new();
        let mut adapter = CallbackAdapter::new(handle(), &mut events, Some(&mut table));
        adapter.file_recv_control(1, 0, 0);
        assert_eq!(
            adapter.finish(),
            Err(ContractViolation::AddressingMismatch {
                notification: "file_recv_control",
            })
        );
        assert!(events.is_empty());
    }

    #[test]
    fn legacy_offer_and_kill_use_unified_ids() -> anyhow::Result<()> {
        let mut events = EventAccumulator::new();
        let mut table = TransferTable::new();
        let mut adapter = CallbackAdapter::new(handle(), &mut events, Some(&mut table));
        adapter.legacy_file_send_request(2, 4, 100, b"photo.png");
        adapter.legacy_file_control(2, legacy::NOTIFY_RECEIVING, 4, legacy::KILL);
        adapter.finish()?;

        let id = FileId::unify(FileDirection::Receive, 4);
        let drained = events.drain().into_events();
        assert!(matches!(
            drained.first(),
            Some(Event::FileRecv { file_number, kind: 0, .. }) if *file_number == id
        ));
        assert!(matches!(
            drained.get(1),
            Some(Event::FileRecvControl { file_number, .. }) if *file_number == id
        ));
        assert!(table.is_empty());
        Ok(())
    }

    #[test]
    fn legacy_empty_name_is_normalised() -> anyhow::Result<()> {
        let mut events = EventAccumulator::new();
        let mut table = TransferTable::new();
        let mut adapter = CallbackAdapter::new(handle(), &mut events, Some(&mut table));
        adapter.friend_name(0, &[0]);
        adapter.finish()?;
        assert_eq!(
            events.drain().into_events(),
            vec![Event::FriendName {
                friend_number: 0,
                name: Vec::new(),
            }]
        );
        Ok(())
    }
}
