//! In-memory engine for tests and host-side simulation.
//!
//! [`SimulatedEngine`] behaves like a small native engine: it keeps friends,
//! groups, and profile fields, answers with realistic error codes, and fires
//! scripted notifications on the next `iterate`. An [`EngineProbe`] shares its
//! state so tests can script notifications and inspect what the bridge sent
//! after the engine has moved into the registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use toxlink_core::engine::{
    ADDRESS_SIZE, AddressingScheme, EngineFactory, NativeEngine, NativeSink, NotificationKind,
};
use toxlink_core::{
    BootstrapError, ErrorKind, FileControlError, FileSendChunkError, FileSendError, FriendAddError,
    FriendByPublicKeyError, FriendCustomPacketError, FriendDeleteError, FriendGetPublicKeyError,
    FriendSendMessageError, GetPortError, GroupLeaveError, GroupSendMessageError,
    GroupStateQueriesError, GroupTopicSetError, NativeOptions, NewError, SetInfoError,
    SetTypingError,
};
use toxlink_events::{PUBLIC_KEY_SIZE, PublicKey};

/// Interval the simulated engine asks to be iterated at.
pub const SIM_ITERATION_INTERVAL: Duration = Duration::from_millis(50);
/// UDP port the simulated engine reports as bound.
pub const SIM_UDP_PORT: u16 = 33_445;

const MAX_NAME_LENGTH: usize = 128;
const MAX_STATUS_MESSAGE_LENGTH: usize = 1_007;
const MAX_MESSAGE_LENGTH: usize = 1_372;
const MAX_FILENAME_LENGTH: usize = 255;
const LOSSLESS_PACKET_IDS: std::ops::RangeInclusive<u8> = 160..=191;
const SAVE_DATA_TOX: u32 = 1;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

type Notification = Box<dyn FnOnce(&mut dyn NativeSink) + Send>;

/// Legacy control the bridge sent to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentLegacyControl {
    /// Friend the control targets.
    pub friend_number: u32,
    /// Direction flag as sent.
    pub send_receive: u8,
    /// Legacy slot index.
    pub file_index: u8,
    /// Legacy control value.
    pub control: u8,
}

/// File data the bridge sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentChunk {
    /// Friend the data targets.
    pub friend_number: u32,
    /// Raw file number, or the legacy slot index.
    pub file_number: u32,
    /// Position given by the bridge; `None` for legacy data.
    pub position: Option<u64>,
    /// Payload.
    pub data: Vec<u8>,
}

#[derive(Default)]
struct SimState {
    script: Vec<Notification>,
    failures: HashMap<&'static str, u32>,
    registered: Vec<NotificationKind>,
    iterations: usize,
    released: bool,
    savedata: Vec<u8>,
    name: Vec<u8>,
    status_message: Vec<u8>,
    status: u32,
    bootstrap_nodes: Vec<(String, u16)>,
    friends: BTreeMap<u32, PublicKey>,
    next_friend: u32,
    next_message_id: u32,
    next_file: u32,
    groups: BTreeMap<u32, Vec<u8>>,
    next_group: u32,
    file_controls: Vec<(u32, u32, u32)>,
    legacy_controls: Vec<SentLegacyControl>,
    chunks: Vec<SentChunk>,
    sent_messages: Vec<(u32, u32, Vec<u8>)>,
}

impl SimState {
    fn fail<E: ErrorKind>(&mut self) -> Result<(), u32> {
        self.failures.remove(E::OPERATION).map_or(Ok(()), Err)
    }

    fn friend(&self, friend_number: u32) -> Option<&PublicKey> {
        self.friends.get(&friend_number)
    }

    fn add_friend(&mut self, public_key: PublicKey) -> Result<u32, u32> {
        if self.friends.values().any(|known| *known == public_key) {
            return Err(FriendAddError::AlreadySent.native_code());
        }
        let friend_number = self.next_friend;
        self.next_friend += 1;
        self.friends.insert(friend_number, public_key);
        Ok(friend_number)
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared view into a [`SimulatedEngine`].
#[derive(Clone)]
pub struct EngineProbe {
    state: Arc<Mutex<SimState>>,
}

impl EngineProbe {
    /// Queue a notification for the next `iterate`.
    pub fn notify<F>(&self, notification: F)
    where
        F: FnOnce(&mut dyn NativeSink) + Send + 'static,
    {
        lock(&self.state).script.push(Box::new(notification));
    }

    /// Make the next call of `operation` fail with the raw `code`.
    pub fn fail_next(&self, operation: &'static str, code: u32) {
        lock(&self.state).failures.insert(operation, code);
    }

    /// Add a friend directly, as if restored from save data.
    #[must_use]
    pub fn add_friend(&self, public_key: PublicKey) -> Option<u32> {
        lock(&self.state).add_friend(public_key).ok()
    }

    /// Create a group with `topic`, returning its number.
    #[must_use]
    pub fn add_group(&self, topic: &[u8]) -> u32 {
        let mut state = lock(&self.state);
        let group_number = state.next_group;
        state.next_group += 1;
        state.groups.insert(group_number, topic.to_vec());
        group_number
    }

    /// Overwrite the raw presence value the engine reports.
    pub fn set_raw_status(&self, status: u32) {
        lock(&self.state).status = status;
    }

    /// Notification kinds registered so far, in order.
    #[must_use]
    pub fn registered(&self) -> Vec<NotificationKind> {
        lock(&self.state).registered.clone()
    }

    /// Number of `iterate` calls.
    #[must_use]
    pub fn iterations(&self) -> usize {
        lock(&self.state).iterations
    }

    /// Whether the engine was dropped.
    #[must_use]
    pub fn released(&self) -> bool {
        lock(&self.state).released
    }

    /// Persisted state the engine reports.
    #[must_use]
    pub fn savedata(&self) -> Vec<u8> {
        lock(&self.state).savedata.clone()
    }

    /// Local nickname.
    #[must_use]
    pub fn name(&self) -> Vec<u8> {
        lock(&self.state).name.clone()
    }

    /// Local status message.
    #[must_use]
    pub fn status_message(&self) -> Vec<u8> {
        lock(&self.state).status_message.clone()
    }

    /// Bootstrap nodes added so far.
    #[must_use]
    pub fn bootstrap_nodes(&self) -> Vec<(String, u16)> {
        lock(&self.state).bootstrap_nodes.clone()
    }

    /// Friends by number.
    #[must_use]
    pub fn friends(&self) -> BTreeMap<u32, PublicKey> {
        lock(&self.state).friends.clone()
    }

    /// Messages sent as `(friend or group, raw type, body)`.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(u32, u32, Vec<u8>)> {
        lock(&self.state).sent_messages.clone()
    }

    /// Unified file controls as `(friend, file, raw control)`.
    #[must_use]
    pub fn file_controls(&self) -> Vec<(u32, u32, u32)> {
        lock(&self.state).file_controls.clone()
    }

    /// Legacy controls sent by the bridge.
    #[must_use]
    pub fn legacy_controls(&self) -> Vec<SentLegacyControl> {
        lock(&self.state).legacy_controls.clone()
    }

    /// File data sent by the bridge.
    #[must_use]
    pub fn sent_chunks(&self) -> Vec<SentChunk> {
        lock(&self.state).chunks.clone()
    }

    /// Current topic of a group.
    #[must_use]
    pub fn group_topic(&self, group_number: u32) -> Option<Vec<u8>> {
        lock(&self.state).groups.get(&group_number).cloned()
    }
}

/// In-memory [`NativeEngine`].
pub struct SimulatedEngine {
    addressing: AddressingScheme,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    /// Create an engine with a fresh identity.
    #[must_use]
    pub fn new(addressing: AddressingScheme) -> (Self, EngineProbe) {
        Self::with_options(addressing, &NativeOptions::default())
    }

    /// Create an engine, restoring save data carried by `options`.
    #[must_use]
    pub fn with_options(addressing: AddressingScheme, options: &NativeOptions) -> (Self, EngineProbe) {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let savedata = if options.savedata_type == SAVE_DATA_TOX {
            options.savedata.clone()
        } else {
            format!("toxlink-sim/{instance}").into_bytes()
        };
        let state = Arc::new(Mutex::new(SimState {
            savedata,
            ..SimState::default()
        }));
        let probe = EngineProbe {
            state: Arc::clone(&state),
        };
        (Self { addressing, state }, probe)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.state().released = true;
    }
}

impl NativeEngine for SimulatedEngine {
    fn addressing(&self) -> AddressingScheme {
        self.addressing
    }

    fn register(&mut self, kind: NotificationKind) {
        self.state().registered.push(kind);
    }

    fn iterate(&mut self, sink: &mut dyn NativeSink) {
        let script = {
            let mut state = self.state();
            state.iterations += 1;
            std::mem::take(&mut state.script)
        };
        for notification in script {
            notification(sink);
        }
    }

    fn iteration_interval(&self) -> Duration {
        SIM_ITERATION_INTERVAL
    }

    fn savedata_size(&self) -> usize {
        self.state().savedata.len()
    }

    fn savedata(&self, out: &mut [u8]) {
        let state = self.state();
        let len = out.len().min(state.savedata.len());
        out[..len].copy_from_slice(&state.savedata[..len]);
    }

    fn bootstrap(&mut self, host: &str, port: u16, _public_key: &PublicKey) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<BootstrapError>()?;
        if host.is_empty() {
            return Err(BootstrapError::BadHost.native_code());
        }
        state.bootstrap_nodes.push((host.to_string(), port));
        Ok(())
    }

    fn udp_port(&self) -> Result<u16, u32> {
        self.state().fail::<GetPortError>()?;
        Ok(SIM_UDP_PORT)
    }

    fn set_name(&mut self, name: &[u8]) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<SetInfoError>()?;
        if name.len() > MAX_NAME_LENGTH {
            return Err(SetInfoError::TooLong.native_code());
        }
        state.name = name.to_vec();
        Ok(())
    }

    fn self_name_size(&self) -> usize {
        self.state().name.len()
    }

    fn self_name(&self, out: &mut [u8]) {
        let state = self.state();
        let len = out.len().min(state.name.len());
        out[..len].copy_from_slice(&state.name[..len]);
    }

    fn set_status_message(&mut self, message: &[u8]) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<SetInfoError>()?;
        if message.len() > MAX_STATUS_MESSAGE_LENGTH {
            return Err(SetInfoError::TooLong.native_code());
        }
        state.status_message = message.to_vec();
        Ok(())
    }

    fn set_status(&mut self, status: u32) {
        self.state().status = status;
    }

    fn status(&self) -> u32 {
        self.state().status
    }

    fn friend_add(&mut self, address: &[u8; ADDRESS_SIZE], message: &[u8]) -> Result<u32, u32> {
        let mut state = self.state();
        state.fail::<FriendAddError>()?;
        if message.is_empty() {
            return Err(FriendAddError::NoMessage.native_code());
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(FriendAddError::TooLong.native_code());
        }
        let mut public_key = [0; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(&address[..PUBLIC_KEY_SIZE]);
        state.add_friend(public_key)
    }

    fn friend_add_norequest(&mut self, public_key: &PublicKey) -> Result<u32, u32> {
        let mut state = self.state();
        state.fail::<FriendAddError>()?;
        state.add_friend(*public_key)
    }

    fn friend_delete(&mut self, friend_number: u32) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<FriendDeleteError>()?;
        state
            .friends
            .remove(&friend_number)
            .map(|_| ())
            .ok_or(FriendDeleteError::FriendNotFound.native_code())
    }

    fn friend_by_public_key(&self, public_key: &PublicKey) -> Result<u32, u32> {
        let mut state = self.state();
        state.fail::<FriendByPublicKeyError>()?;
        state
            .friends
            .iter()
            .find(|(_, known)| *known == public_key)
            .map(|(friend_number, _)| *friend_number)
            .ok_or(FriendByPublicKeyError::NotFound.native_code())
    }

    fn friend_public_key(&self, friend_number: u32) -> Result<PublicKey, u32> {
        let mut state = self.state();
        state.fail::<FriendGetPublicKeyError>()?;
        state
            .friend(friend_number)
            .copied()
            .ok_or(FriendGetPublicKeyError::FriendNotFound.native_code())
    }

    fn set_typing(&mut self, friend_number: u32, _is_typing: bool) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<SetTypingError>()?;
        state
            .friend(friend_number)
            .map(|_| ())
            .ok_or(SetTypingError::FriendNotFound.native_code())
    }

    fn friend_send_message(
        &mut self,
        friend_number: u32,
        message_type: u32,
        message: &[u8],
    ) -> Result<u32, u32> {
        let mut state = self.state();
        state.fail::<FriendSendMessageError>()?;
        if state.friend(friend_number).is_none() {
            return Err(FriendSendMessageError::FriendNotFound.native_code());
        }
        if message.is_empty() {
            return Err(FriendSendMessageError::Empty.native_code());
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(FriendSendMessageError::TooLong.native_code());
        }
        state
            .sent_messages
            .push((friend_number, message_type, message.to_vec()));
        let message_id = state.next_message_id;
        state.next_message_id += 1;
        Ok(message_id)
    }

    fn friend_send_lossless_packet(&mut self, friend_number: u32, data: &[u8]) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<FriendCustomPacketError>()?;
        if state.friend(friend_number).is_none() {
            return Err(FriendCustomPacketError::FriendNotFound.native_code());
        }
        match data.first() {
            None => Err(FriendCustomPacketError::Empty.native_code()),
            Some(id) if !LOSSLESS_PACKET_IDS.contains(id) => {
                Err(FriendCustomPacketError::Invalid.native_code())
            }
            Some(_) if data.len() > MAX_MESSAGE_LENGTH => {
                Err(FriendCustomPacketError::TooLong.native_code())
            }
            Some(_) => Ok(()),
        }
    }

    fn file_send(
        &mut self,
        friend_number: u32,
        _kind: u32,
        _file_size: u64,
        filename: &[u8],
    ) -> Result<u32, u32> {
        let mut state = self.state();
        state.fail::<FileSendError>()?;
        if state.friend(friend_number).is_none() {
            return Err(FileSendError::FriendNotFound.native_code());
        }
        if filename.len() > MAX_FILENAME_LENGTH {
            return Err(FileSendError::NameTooLong.native_code());
        }
        let file_number = state.next_file;
        state.next_file += 1;
        Ok(file_number)
    }

    fn file_control(&mut self, friend_number: u32, file_number: u32, control: u32) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<FileControlError>()?;
        if state.friend(friend_number).is_none() {
            return Err(FileControlError::FriendNotFound.native_code());
        }
        state.file_controls.push((friend_number, file_number, control));
        Ok(())
    }

    fn file_send_chunk(
        &mut self,
        friend_number: u32,
        file_number: u32,
        position: u64,
        data: &[u8],
    ) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<FileSendChunkError>()?;
        if state.friend(friend_number).is_none() {
            return Err(FileSendChunkError::FriendNotFound.native_code());
        }
        state.chunks.push(SentChunk {
            friend_number,
            file_number,
            position: Some(position),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn legacy_file_control(
        &mut self,
        friend_number: u32,
        send_receive: u8,
        file_index: u8,
        control: u8,
    ) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<FileControlError>()?;
        state.legacy_controls.push(SentLegacyControl {
            friend_number,
            send_receive,
            file_index,
            control,
        });
        Ok(())
    }

    fn legacy_file_data(&mut self, friend_number: u32, file_index: u8, data: &[u8]) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<FileSendChunkError>()?;
        state.chunks.push(SentChunk {
            friend_number,
            file_number: u32::from(file_index),
            position: None,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn group_send_message(
        &mut self,
        group_number: u32,
        message_type: u32,
        message: &[u8],
    ) -> Result<u32, u32> {
        let mut state = self.state();
        state.fail::<GroupSendMessageError>()?;
        if !state.groups.contains_key(&group_number) {
            return Err(GroupSendMessageError::GroupNotFound.native_code());
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(GroupSendMessageError::TooLong.native_code());
        }
        state
            .sent_messages
            .push((group_number, message_type, message.to_vec()));
        let message_id = state.next_message_id;
        state.next_message_id += 1;
        Ok(message_id)
    }

    fn group_set_topic(&mut self, group_number: u32, topic: &[u8]) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<GroupTopicSetError>()?;
        let current = state
            .groups
            .get_mut(&group_number)
            .ok_or(GroupTopicSetError::GroupNotFound.native_code())?;
        *current = topic.to_vec();
        Ok(())
    }

    fn group_topic_size(&self, group_number: u32) -> Result<usize, u32> {
        let mut state = self.state();
        state.fail::<GroupStateQueriesError>()?;
        state
            .groups
            .get(&group_number)
            .map(Vec::len)
            .ok_or(GroupStateQueriesError::GroupNotFound.native_code())
    }

    fn group_topic(&self, group_number: u32, out: &mut [u8]) -> Result<(), u32> {
        let state = self.state();
        let topic = state
            .groups
            .get(&group_number)
            .ok_or(GroupStateQueriesError::GroupNotFound.native_code())?;
        let len = out.len().min(topic.len());
        out[..len].copy_from_slice(&topic[..len]);
        Ok(())
    }

    fn group_leave(&mut self, group_number: u32, _part_message: &[u8]) -> Result<(), u32> {
        let mut state = self.state();
        state.fail::<GroupLeaveError>()?;
        state
            .groups
            .remove(&group_number)
            .map(|_| ())
            .ok_or(GroupLeaveError::GroupNotFound.native_code())
    }
}

#[derive(Default)]
struct FactoryState {
    fail_with: Option<u32>,
    probes: Vec<EngineProbe>,
    options: Vec<NativeOptions>,
}

/// [`EngineFactory`] producing [`SimulatedEngine`]s.
pub struct SimulatedFactory {
    addressing: AddressingScheme,
    state: Mutex<FactoryState>,
}

impl SimulatedFactory {
    /// Factory for engines using `addressing`.
    #[must_use]
    pub fn new(addressing: AddressingScheme) -> Self {
        Self {
            addressing,
            state: Mutex::new(FactoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `create` fail with the raw `code`.
    pub fn fail_next(&self, code: u32) {
        self.state().fail_with = Some(code);
    }

    /// Probes of every engine created so far.
    #[must_use]
    pub fn probes(&self) -> Vec<EngineProbe> {
        self.state().probes.clone()
    }

    /// Probe of the most recently created engine.
    #[must_use]
    pub fn last_probe(&self) -> Option<EngineProbe> {
        self.state().probes.last().cloned()
    }

    /// Options passed to the most recent `create`.
    #[must_use]
    pub fn last_options(&self) -> Option<NativeOptions> {
        self.state().options.last().cloned()
    }
}

impl EngineFactory for SimulatedFactory {
    fn create(&self, options: &NativeOptions) -> Result<Box<dyn NativeEngine>, u32> {
        let mut state = self.state();
        state.options.push(options.clone());
        if let Some(code) = state.fail_with.take() {
            return Err(code);
        }
        if options.proxy_type != 0 && options.proxy_host.is_empty() {
            return Err(NewError::ProxyBadHost.native_code());
        }
        let (engine, probe) = SimulatedEngine::with_options(self.addressing, options);
        state.probes.push(probe);
        Ok(Box::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_notifications_fire_once() {
        struct Count(usize);
        impl NativeSink for Count {
            fn self_connection_status(&mut self, _: u32) {
                self.0 += 1;
            }
            fn friend_name(&mut self, _: u32, _: &[u8]) {}
            fn friend_status_message(&mut self, _: u32, _: &[u8]) {}
            fn friend_status(&mut self, _: u32, _: u32) {}
            fn friend_connection_status(&mut self, _: u32, _: u32) {}
            fn friend_typing(&mut self, _: u32, _: bool) {}
            fn friend_read_receipt(&mut self, _: u32, _: u32) {}
            fn friend_request(&mut self, _: &PublicKey, _: &[u8]) {}
            fn friend_message(&mut self, _: u32, _: u32, _: &[u8]) {}
            fn friend_lossy_packet(&mut self, _: u32, _: &[u8]) {}
            fn friend_lossless_packet(&mut self, _: u32, _: &[u8]) {}
            fn file_recv(&mut self, _: u32, _: u32, _: u32, _: u64, _: &[u8]) {}
            fn file_recv_control(&mut self, _: u32, _: u32, _: u32) {}
            fn file_chunk_request(&mut self, _: u32, _: u32, _: u64, _: u64) {}
            fn file_recv_chunk(&mut self, _: u32, _: u32, _: u64, _: &[u8]) {}
            fn group_peer_name(&mut self, _: u32, _: u32, _: &[u8]) {}
            fn group_peer_status(&mut self, _: u32, _: u32, _: u32) {}
            fn group_topic(&mut self, _: u32, _: u32, _: &[u8]) {}
            fn group_privacy_state(&mut self, _: u32, _: u32) {}
            fn group_peer_limit(&mut self, _: u32, _: u32) {}
            fn group_password(&mut self, _: u32, _: &[u8]) {}
            fn group_peerlist_update(&mut self, _: u32) {}
            fn group_message(&mut self, _: u32, _: u32, _: u32, _: &[u8]) {}
            fn group_private_message(&mut self, _: u32, _: u32, _: &[u8]) {}
            fn group_invite(&mut self, _: u32, _: &[u8]) {}
            fn group_peer_join(&mut self, _: u32, _: u32) {}
            fn group_peer_exit(&mut self, _: u32, _: u32, _: &[u8]) {}
            fn group_self_join(&mut self, _: u32) {}
            fn group_join_fail(&mut self, _: u32, _: u32) {}
            fn group_moderation(&mut self, _: u32, _: u32, _: u32, _: u32) {}
            fn legacy_file_send_request(&mut self, _: u32, _: u8, _: u64, _: &[u8]) {}
            fn legacy_file_control(&mut self, _: u32, _: u8, _: u8, _: u8) {}
            fn legacy_file_data(&mut self, _: u32, _: u8, _: &[u8]) {}
        }

        let (mut engine, probe) = SimulatedEngine::new(AddressingScheme::Unified);
        probe.notify(|sink| sink.self_connection_status(1));
        probe.notify(|sink| sink.self_connection_status(2));
        let mut sink = Count(0);
        engine.iterate(&mut sink);
        engine.iterate(&mut sink);
        assert_eq!(sink.0, 2);
        assert_eq!(probe.iterations(), 2);
    }

    #[test]
    fn injected_failure_applies_once() {
        let (mut engine, probe) = SimulatedEngine::new(AddressingScheme::Unified);
        probe.fail_next(SetInfoError::OPERATION, 2);
        assert_eq!(engine.set_name(b"alice"), Err(2));
        assert_eq!(engine.set_name(b"alice"), Ok(()));
        assert_eq!(engine.self_name_size(), 5);
    }

    #[test]
    fn friends_use_documented_codes() {
        let (mut engine, _probe) = SimulatedEngine::new(AddressingScheme::Unified);
        let key = [3; PUBLIC_KEY_SIZE];
        assert_eq!(engine.friend_add_norequest(&key), Ok(0));
        assert_eq!(
            engine.friend_add_norequest(&key),
            Err(FriendAddError::AlreadySent.native_code())
        );
        assert_eq!(engine.friend_by_public_key(&key), Ok(0));
        assert_eq!(
            engine.friend_delete(9),
            Err(FriendDeleteError::FriendNotFound.native_code())
        );
    }

    #[test]
    fn drop_marks_released() {
        let (engine, probe) = SimulatedEngine::new(AddressingScheme::Legacy);
        drop(engine);
        assert!(probe.released());
    }

    #[test]
    fn factory_restores_tox_save() -> anyhow::Result<()> {
        let factory = SimulatedFactory::new(AddressingScheme::Unified);
        let options = NativeOptions {
            savedata_type: SAVE_DATA_TOX,
            savedata: b"blob".to_vec(),
            ..NativeOptions::default()
        };
        let engine = factory
            .create(&options)
            .map_err(|code| anyhow::anyhow!("create failed with {code}"))?;
        assert_eq!(engine.savedata_size(), 4);
        assert_eq!(factory.last_options(), Some(options));

        factory.fail_next(NewError::LoadBadFormat.native_code());
        assert!(factory.create(&NativeOptions::default()).is_err());
        assert_eq!(factory.probes().len(), 1);
        Ok(())
    }
}
