//! Caller-facing operations over registered sessions.
//!
//! # Design
//! - Every operation resolves its handle through the registry and runs under
//!   that session's lock; nothing here touches an engine directly.
//! - Raw engine codes are translated through the operation's error catalogue.
//!   A documented code becomes [`CallError::Failed`]; anything else is a
//!   contract violation that poisons the session.
//! - File operations on legacy engines go through the session's transfer
//!   table so callers only ever see unified file ids.

use std::sync::Arc;
use std::time::Duration;

use toxlink_core::engine::{ADDRESS_SIZE, EngineFactory, NativeSink};
use toxlink_core::{
    BootstrapError, BridgeError, CallError, ContractViolation, EngineOptions, ErrorKind,
    FileControlError, FileSendChunkError, FileSendError, FriendAddError, FriendByPublicKeyError,
    FriendCustomPacketError, FriendDeleteError, FriendGetPublicKeyError, FriendSendMessageError,
    GetPortError, GroupLeaveError, GroupSendMessageError, GroupStateQueriesError,
    GroupTopicSetError, Handle, NewError, SetInfoError, SetTypingError,
};
use toxlink_events::{EventBatch, FileControl, FileId, MessageType, PublicKey, UserStatus};
use tracing::{debug, error, warn};

use crate::convert;
use crate::guard::SessionGuard;
use crate::registry::Registry;
use crate::session::SessionContext;

/// Map a raw failure code onto the operation's catalogue.
fn classify<E: ErrorKind>(code: u32) -> Result<E, ContractViolation> {
    match E::from_native(code)? {
        Some(kind) => Ok(kind),
        None => Err(ContractViolation::UnexpectedErrorCode {
            operation: E::OPERATION,
            code,
        }),
    }
}

fn translate<T, E: ErrorKind>(
    ctx: &mut SessionContext<'_>,
    outcome: Result<T, u32>,
) -> Result<T, CallError<E>> {
    match outcome {
        Ok(value) => Ok(value),
        Err(code) => match classify::<E>(code) {
            Ok(kind) => {
                debug!(
                    handle = %ctx.handle(),
                    operation = E::OPERATION,
                    error = %kind,
                    "engine reported failure"
                );
                Err(CallError::Failed(kind))
            }
            Err(violation) => Err(ctx.poison(violation).into()),
        },
    }
}

/// Entry point used by the calling runtime.
pub struct Bridge {
    registry: Arc<Registry>,
    factory: Arc<dyn EngineFactory>,
}

impl Bridge {
    /// Bridge creating engines through `factory` and registering them in
    /// `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, factory: Arc<dyn EngineFactory>) -> Self {
        Self { registry, factory }
    }

    /// Registry holding every session created by this bridge.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Validate `options`, create an engine, and register it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidOptions`] for rejected options, a
    /// [`NewError`] reported by the engine, or a registry failure.
    pub fn create(&self, options: &EngineOptions) -> Result<Handle, CallError<NewError>> {
        let plan = options.plan().map_err(BridgeError::from)?;
        for warning in &plan.warnings {
            warn!(warning = %warning, "engine option guard rail applied");
        }
        let engine = match self.factory.create(&plan.options) {
            Ok(engine) => engine,
            Err(code) => {
                return Err(match classify::<NewError>(code) {
                    Ok(kind) => CallError::Failed(kind),
                    Err(violation) => {
                        error!(violation = ?violation, "engine creation returned an unknown code");
                        violation.into()
                    }
                });
            }
        };
        Ok(self.registry.add(engine)?)
    }

    /// Like [`Bridge::create`], wrapping the handle in a [`SessionGuard`].
    ///
    /// # Errors
    ///
    /// Same as [`Bridge::create`].
    pub fn create_guarded(&self, options: &EngineOptions) -> Result<SessionGuard, CallError<NewError>> {
        let handle = self.create(options)?;
        Ok(SessionGuard::new(Arc::clone(&self.registry), handle))
    }

    /// Release a session's engine.
    ///
    /// # Errors
    ///
    /// See [`Registry::kill`].
    pub fn kill(&self, handle: Handle) -> Result<(), BridgeError> {
        self.registry.kill(handle)
    }

    /// Reclaim a session's slot.
    ///
    /// # Errors
    ///
    /// See [`Registry::finalize`].
    pub fn finalize(&self, handle: Handle) -> Result<(), BridgeError> {
        self.registry.finalize(handle)
    }

    /// Kill and finalize every session; returns how many were reclaimed.
    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }

    /// Run one engine iteration.
    ///
    /// # Errors
    ///
    /// Returns a registry failure or the contract violation that poisoned the
    /// session.
    pub fn iterate(&self, handle: Handle) -> Result<(), BridgeError> {
        self.registry.with_session(handle, |ctx| ctx.iterate())
    }

    /// Delay the engine wants before the next iteration.
    ///
    /// # Errors
    ///
    /// Returns a registry failure.
    pub fn iteration_interval(&self, handle: Handle) -> Result<Duration, BridgeError> {
        self.registry
            .with_session(handle, |ctx| Ok(ctx.engine().iteration_interval()))
    }

    /// Take every event accumulated since the previous drain.
    ///
    /// # Errors
    ///
    /// Returns a registry failure.
    pub fn drain(&self, handle: Handle) -> Result<EventBatch, BridgeError> {
        self.registry.drain(handle)
    }

    /// Drain and encode the batch as JSON.
    ///
    /// # Errors
    ///
    /// Returns a registry failure or [`BridgeError::Encode`].
    pub fn drain_encoded(&self, handle: Handle) -> Result<Vec<u8>, BridgeError> {
        Ok(self.drain(handle)?.encode()?)
    }

    /// Deliver notifications to a session as if its engine fired them.
    ///
    /// # Errors
    ///
    /// Returns a registry failure or the contract violation the
    /// notifications caused.
    pub fn invoke<F>(&self, handle: Handle, notify: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut dyn NativeSink),
    {
        self.registry
            .with_session(handle, |ctx| ctx.dispatch(notify))
    }

    /// Persisted engine state, byte for byte.
    ///
    /// # Errors
    ///
    /// Returns a registry failure.
    pub fn save(&self, handle: Handle) -> Result<Vec<u8>, BridgeError> {
        self.registry.with_session(handle, |ctx| {
            let engine = ctx.engine();
            let mut blob = vec![0; engine.savedata_size()];
            engine.savedata(&mut blob);
            Ok(blob)
        })
    }

    /// Add a bootstrap node.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::BadHost`] for an empty host,
    /// [`BootstrapError::BadPort`] for a port outside `1..=65535`, or the
    /// engine's failure.
    pub fn bootstrap(
        &self,
        handle: Handle,
        host: &str,
        port: u32,
        public_key: &PublicKey,
    ) -> Result<(), CallError<BootstrapError>> {
        self.registry.with_session(handle, |ctx| {
            if host.is_empty() {
                return Err(CallError::Failed(BootstrapError::BadHost));
            }
            let port = u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .ok_or(CallError::Failed(BootstrapError::BadPort))?;
            let outcome = ctx.engine().bootstrap(host, port, public_key);
            translate(ctx, outcome)
        })
    }

    /// UDP port the node is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`GetPortError::NotBound`] or a registry failure.
    pub fn get_udp_port(&self, handle: Handle) -> Result<u16, CallError<GetPortError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().udp_port();
            translate(ctx, outcome)
        })
    }

    /// Set the local nickname.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`SetInfoError`] or a registry failure.
    pub fn self_set_name(&self, handle: Handle, name: &[u8]) -> Result<(), CallError<SetInfoError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().set_name(name);
            translate(ctx, outcome)
        })
    }

    /// Local nickname.
    ///
    /// # Errors
    ///
    /// Returns a registry failure.
    pub fn self_get_name(&self, handle: Handle) -> Result<Vec<u8>, BridgeError> {
        self.registry.with_session(handle, |ctx| {
            let engine = ctx.engine();
            let mut name = vec![0; engine.self_name_size()];
            engine.self_name(&mut name);
            Ok(name)
        })
    }

    /// Set the local status message.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`SetInfoError`] or a registry failure.
    pub fn self_set_status_message(
        &self,
        handle: Handle,
        message: &[u8],
    ) -> Result<(), CallError<SetInfoError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().set_status_message(message);
            translate(ctx, outcome)
        })
    }

    /// Set the local presence.
    ///
    /// # Errors
    ///
    /// Returns a registry failure.
    pub fn self_set_status(&self, handle: Handle, status: UserStatus) -> Result<(), BridgeError> {
        self.registry.with_session(handle, |ctx| {
            ctx.engine()
                .set_status(convert::user_status_to_native(status));
            Ok(())
        })
    }

    /// Local presence.
    ///
    /// # Errors
    ///
    /// Returns a registry failure, or a contract violation when the engine
    /// reports a value outside the presence table.
    pub fn self_get_status(&self, handle: Handle) -> Result<UserStatus, BridgeError> {
        self.registry.with_session(handle, |ctx| {
            let raw = ctx.engine().status();
            convert::user_status(raw).map_err(|violation| ctx.poison(violation))
        })
    }

    /// Send a friend request; returns the new friend number.
    ///
    /// # Errors
    ///
    /// Returns [`FriendAddError::NoMessage`] for an empty message, the
    /// engine's failure, or a registry failure.
    pub fn friend_add(
        &self,
        handle: Handle,
        address: &[u8; ADDRESS_SIZE],
        message: &[u8],
    ) -> Result<u32, CallError<FriendAddError>> {
        self.registry.with_session(handle, |ctx| {
            if message.is_empty() {
                return Err(CallError::Failed(FriendAddError::NoMessage));
            }
            let outcome = ctx.engine().friend_add(address, message);
            translate(ctx, outcome)
        })
    }

    /// Add a friend without sending a request.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`FriendAddError`] or a registry failure.
    pub fn friend_add_norequest(
        &self,
        handle: Handle,
        public_key: &PublicKey,
    ) -> Result<u32, CallError<FriendAddError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().friend_add_norequest(public_key);
            translate(ctx, outcome)
        })
    }

    /// Remove a friend.
    ///
    /// # Errors
    ///
    /// Returns [`FriendDeleteError::FriendNotFound`] or a registry failure.
    pub fn friend_delete(
        &self,
        handle: Handle,
        friend_number: u32,
    ) -> Result<(), CallError<FriendDeleteError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().friend_delete(friend_number);
            translate(ctx, outcome)
        })
    }

    /// Friend number for a public key.
    ///
    /// # Errors
    ///
    /// Returns [`FriendByPublicKeyError::NotFound`] or a registry failure.
    pub fn friend_by_public_key(
        &self,
        handle: Handle,
        public_key: &PublicKey,
    ) -> Result<u32, CallError<FriendByPublicKeyError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().friend_by_public_key(public_key);
            translate(ctx, outcome)
        })
    }

    /// Public key of a friend.
    ///
    /// # Errors
    ///
    /// Returns [`FriendGetPublicKeyError::FriendNotFound`] or a registry
    /// failure.
    pub fn friend_get_public_key(
        &self,
        handle: Handle,
        friend_number: u32,
    ) -> Result<PublicKey, CallError<FriendGetPublicKeyError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().friend_public_key(friend_number);
            translate(ctx, outcome)
        })
    }

    /// Set our typing indicator for a friend.
    ///
    /// # Errors
    ///
    /// Returns [`SetTypingError::FriendNotFound`] or a registry failure.
    pub fn set_typing(
        &self,
        handle: Handle,
        friend_number: u32,
        is_typing: bool,
    ) -> Result<(), CallError<SetTypingError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().set_typing(friend_number, is_typing);
            translate(ctx, outcome)
        })
    }

    /// Send a message to a friend; returns its message id.
    ///
    /// # Errors
    ///
    /// Returns [`FriendSendMessageError::Empty`] for an empty message, the
    /// engine's failure, or a registry failure.
    pub fn friend_send_message(
        &self,
        handle: Handle,
        friend_number: u32,
        message_type: MessageType,
        message: &[u8],
    ) -> Result<u32, CallError<FriendSendMessageError>> {
        self.registry.with_session(handle, |ctx| {
            if message.is_empty() {
                return Err(CallError::Failed(FriendSendMessageError::Empty));
            }
            let outcome = ctx.engine().friend_send_message(
                friend_number,
                convert::message_type_to_native(message_type),
                message,
            );
            translate(ctx, outcome)
        })
    }

    /// Send a lossless custom packet.
    ///
    /// # Errors
    ///
    /// Returns [`FriendCustomPacketError::Empty`] for an empty packet, the
    /// engine's failure, or a registry failure.
    pub fn friend_send_lossless_packet(
        &self,
        handle: Handle,
        friend_number: u32,
        data: &[u8],
    ) -> Result<(), CallError<FriendCustomPacketError>> {
        self.registry.with_session(handle, |ctx| {
            if data.is_empty() {
                return Err(CallError::Failed(FriendCustomPacketError::Empty));
            }
            let outcome = ctx.engine().friend_send_lossless_packet(friend_number, data);
            translate(ctx, outcome)
        })
    }

    /// Offer a file to a friend; returns its unified id.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`FileSendError`] or a registry failure.
    pub fn file_send(
        &self,
        handle: Handle,
        friend_number: u32,
        kind: u32,
        file_size: u64,
        filename: &[u8],
    ) -> Result<FileId, CallError<FileSendError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx
                .engine()
                .file_send(friend_number, kind, file_size, filename);
            let raw = translate::<_, FileSendError>(ctx, outcome)?;
            let registered = match ctx.transfers() {
                Some(table) => table.local_send(friend_number, raw, file_size),
                None => return Ok(FileId::from_raw(raw)),
            };
            let file_number = registered.map_err(|violation| ctx.poison(violation))?;
            debug!(
                handle = %ctx.handle(),
                friend_number,
                file_id = %file_number,
                file_size,
                "file transfer offered"
            );
            Ok(file_number)
        })
    }

    /// Accept, pause, resume, or cancel a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`FileControlError::NotFound`] for unknown ids, the engine's
    /// failure, or a registry failure.
    pub fn file_control(
        &self,
        handle: Handle,
        friend_number: u32,
        file_number: FileId,
        control: FileControl,
    ) -> Result<(), CallError<FileControlError>> {
        self.registry.with_session(handle, |ctx| {
            let resolved = match ctx.transfers() {
                Some(table) => table.resolve_control(friend_number, file_number, control),
                None => {
                    let outcome = ctx.engine().file_control(
                        friend_number,
                        file_number.into_raw(),
                        convert::file_control_to_native(control),
                    );
                    return translate(ctx, outcome);
                }
            };
            let outbound = resolved.map_err(CallError::Failed)?;
            let outcome = ctx.engine().legacy_file_control(
                outbound.friend_number,
                outbound.send_receive,
                outbound.file_index,
                outbound.control,
            );
            translate::<_, FileControlError>(ctx, outcome)?;
            if let Some(table) = ctx.transfers() {
                table.commit_control(friend_number, file_number, control);
            }
            Ok(())
        })
    }

    /// Send the chunk of an outgoing file starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`FileSendChunkError::NotFound`], `WrongPosition`, or
    /// `InvalidLength` for chunks that do not fit the transfer, the engine's
    /// failure, or a registry failure.
    pub fn file_send_chunk(
        &self,
        handle: Handle,
        friend_number: u32,
        file_number: FileId,
        position: u64,
        data: &[u8],
    ) -> Result<(), CallError<FileSendChunkError>> {
        self.registry.with_session(handle, |ctx| {
            let length = data.len() as u64;
            let resolved = match ctx.transfers() {
                Some(table) => table.resolve_chunk(friend_number, file_number, position, length),
                None => {
                    let outcome = ctx.engine().file_send_chunk(
                        friend_number,
                        file_number.into_raw(),
                        position,
                        data,
                    );
                    return translate(ctx, outcome);
                }
            };
            let file_index = resolved.map_err(CallError::Failed)?;
            if !data.is_empty() {
                let outcome = ctx
                    .engine()
                    .legacy_file_data(friend_number, file_index, data);
                translate::<_, FileSendChunkError>(ctx, outcome)?;
            }
            if let Some(table) = ctx.transfers() {
                table.commit_chunk(friend_number, file_number, length);
            }
            Ok(())
        })
    }

    /// Send a message to a whole group; returns its message id.
    ///
    /// # Errors
    ///
    /// Returns [`GroupSendMessageError::Empty`] for an empty message, the
    /// engine's failure, or a registry failure.
    pub fn group_send_message(
        &self,
        handle: Handle,
        group_number: u32,
        message_type: MessageType,
        message: &[u8],
    ) -> Result<u32, CallError<GroupSendMessageError>> {
        self.registry.with_session(handle, |ctx| {
            if message.is_empty() {
                return Err(CallError::Failed(GroupSendMessageError::Empty));
            }
            let outcome = ctx.engine().group_send_message(
                group_number,
                convert::message_type_to_native(message_type),
                message,
            );
            translate(ctx, outcome)
        })
    }

    /// Change a group's topic.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`GroupTopicSetError`] or a registry failure.
    pub fn group_set_topic(
        &self,
        handle: Handle,
        group_number: u32,
        topic: &[u8],
    ) -> Result<(), CallError<GroupTopicSetError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().group_set_topic(group_number, topic);
            translate(ctx, outcome)
        })
    }

    /// A group's topic.
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateQueriesError::GroupNotFound`] or a registry
    /// failure.
    pub fn group_get_topic(
        &self,
        handle: Handle,
        group_number: u32,
    ) -> Result<Vec<u8>, CallError<GroupStateQueriesError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().group_topic_size(group_number);
            let size = translate::<_, GroupStateQueriesError>(ctx, outcome)?;
            let mut topic = vec![0; size];
            let outcome = ctx.engine().group_topic(group_number, &mut topic);
            translate::<_, GroupStateQueriesError>(ctx, outcome)?;
            Ok(topic)
        })
    }

    /// Leave a group with an optional parting message.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`GroupLeaveError`] or a registry failure.
    pub fn group_leave(
        &self,
        handle: Handle,
        group_number: u32,
        part_message: &[u8],
    ) -> Result<(), CallError<GroupLeaveError>> {
        self.registry.with_session(handle, |ctx| {
            let outcome = ctx.engine().group_leave(group_number, part_message);
            translate(ctx, outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedFactory;
    use toxlink_core::engine::AddressingScheme;
    use toxlink_core::{ProxyOptions, ProxyType, RegistryConfig};

    fn bridge(addressing: AddressingScheme) -> (Bridge, Arc<SimulatedFactory>) {
        let factory = Arc::new(SimulatedFactory::new(addressing));
        let registry = Arc::new(Registry::new(RegistryConfig::default()));
        (Bridge::new(registry, factory.clone()), factory)
    }

    #[test]
    fn invalid_options_never_reach_the_factory() {
        let (bridge, factory) = bridge(AddressingScheme::Unified);
        let options = EngineOptions {
            proxy: ProxyOptions {
                kind: ProxyType::Socks5,
                host: String::new(),
                port: 9050,
            },
            ..EngineOptions::default()
        };
        let outcome = bridge.create(&options);
        assert!(matches!(
            outcome,
            Err(CallError::Bridge(BridgeError::InvalidOptions { .. }))
        ));
        assert!(factory.last_options().is_none());
    }

    #[test]
    fn factory_codes_are_translated() {
        let (bridge, factory) = bridge(AddressingScheme::Unified);
        factory.fail_next(NewError::LoadEncrypted.native_code());
        let outcome = bridge.create(&EngineOptions::default());
        assert!(matches!(
            outcome,
            Err(CallError::Failed(NewError::LoadEncrypted))
        ));

        factory.fail_next(77);
        let outcome = bridge.create(&EngineOptions::default());
        let violation = outcome
            .err()
            .and_then(|err| err.bridge().and_then(BridgeError::contract_violation).cloned());
        assert_eq!(
            violation,
            Some(ContractViolation::UnexpectedErrorCode {
                operation: "new",
                code: 77,
            })
        );
    }

    #[test]
    fn caller_usage_errors_map_to_documented_kinds() -> anyhow::Result<()> {
        let (bridge, _factory) = bridge(AddressingScheme::Unified);
        let handle = bridge.create(&EngineOptions::default())?;
        let key = [1; 32];

        assert!(matches!(
            bridge.bootstrap(handle, "node.example", 0, &key),
            Err(CallError::Failed(BootstrapError::BadPort))
        ));
        assert!(matches!(
            bridge.bootstrap(handle, "node.example", 70_000, &key),
            Err(CallError::Failed(BootstrapError::BadPort))
        ));
        assert!(matches!(
            bridge.bootstrap(handle, "", 33_445, &key),
            Err(CallError::Failed(BootstrapError::BadHost))
        ));
        assert!(matches!(
            bridge.friend_add(handle, &[2; ADDRESS_SIZE], b""),
            Err(CallError::Failed(FriendAddError::NoMessage))
        ));
        assert!(matches!(
            bridge.friend_send_message(handle, 0, MessageType::Normal, b""),
            Err(CallError::Failed(FriendSendMessageError::Empty))
        ));
        bridge.iterate(handle)?;
        Ok(())
    }

    #[test]
    fn unified_file_ids_pass_through() -> anyhow::Result<()> {
        let (bridge, factory) = bridge(AddressingScheme::Unified);
        let handle = bridge.create(&EngineOptions::default())?;
        let probe = factory
            .last_probe()
            .ok_or_else(|| anyhow::anyhow!("no engine created"))?;
        let friend = bridge.friend_add_norequest(handle, &[9; 32])?;

        let id = bridge.file_send(handle, friend, 0, 10, b"notes.txt")?;
        bridge.file_control(handle, friend, id, FileControl::Pause)?;
        bridge.file_send_chunk(handle, friend, id, 0, b"0123456789")?;

        assert_eq!(probe.file_controls(), vec![(friend, id.into_raw(), 1)]);
        assert_eq!(probe.sent_chunks().len(), 1);
        Ok(())
    }
}
