//! File transfer bookkeeping for engines using legacy file addressing.
//!
//! # Design
//! - Legacy engines number transfers per direction with an 8-bit index; the
//!   table keys every transfer by `(friend, FileId)` so callers see one stable
//!   id for its whole life.
//! - Legacy engines never request chunks and never close finished downloads;
//!   the table synthesises the chunk requests and queues the closing control.
//! - An entry lives from creation until exactly one terminal transition
//!   (finished or cancelled) removes it. A notification for a missing entry is
//!   a contract violation, a caller operation on a missing entry is a normal
//!   `NotFound` error.

use std::collections::BTreeMap;

use toxlink_core::engine::legacy;
use toxlink_core::{ContractViolation, FileControlError, FileSendChunkError};
use toxlink_events::{Event, FileControl, FileDirection, FileId};

use crate::convert;

/// Progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for the peer or the caller to accept or resume.
    Paused,
    /// Data is flowing.
    Running,
    /// Every byte was delivered; the entry is about to be removed.
    Finished,
}

/// One live legacy transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    /// Whether we send or receive the file.
    pub direction: FileDirection,
    /// Current progress state.
    pub state: TransferState,
    /// Bytes delivered so far. Never decreases, never exceeds `size`.
    pub position: u64,
    /// Declared file size.
    pub size: u64,
    /// A synthetic chunk request is outstanding (send side only).
    pub request_pending: bool,
}

impl FileTransfer {
    const fn new(direction: FileDirection, size: u64) -> Self {
        Self {
            direction,
            state: TransferState::Paused,
            position: 0,
            size,
            request_pending: false,
        }
    }
}

/// Legacy control the bridge must send to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OutboundControl {
    pub(crate) friend_number: u32,
    pub(crate) file_number: FileId,
    pub(crate) send_receive: u8,
    pub(crate) file_index: u8,
    pub(crate) control: u8,
}

/// Live legacy transfers of one session.
#[derive(Debug, Default)]
pub struct TransferTable {
    entries: BTreeMap<(u32, FileId), FileTransfer>,
    outbound: Vec<OutboundControl>,
}

impl TransferTable {
    /// Create an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            outbound: Vec::new(),
        }
    }

    /// Number of live transfers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no transfer is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a live transfer.
    #[must_use]
    pub fn get(&self, friend_number: u32, file_number: FileId) -> Option<&FileTransfer> {
        self.entries.get(&(friend_number, file_number))
    }

    fn create(
        &mut self,
        friend_number: u32,
        direction: FileDirection,
        index: u8,
        size: u64,
    ) -> Result<FileId, ContractViolation> {
        let file_number = FileId::unify(direction, index);
        let key = (friend_number, file_number);
        if self.entries.contains_key(&key) {
            return Err(ContractViolation::DuplicateTransfer {
                friend_number,
                file_number,
            });
        }
        self.entries.insert(key, FileTransfer::new(direction, size));
        Ok(file_number)
    }

    fn entry_mut(
        &mut self,
        friend_number: u32,
        file_number: FileId,
    ) -> Result<&mut FileTransfer, ContractViolation> {
        self.entries
            .get_mut(&(friend_number, file_number))
            .ok_or(ContractViolation::MissingTransfer {
                friend_number,
                file_number,
            })
    }

    /// The peer offered a file on receive slot `index`.
    pub(crate) fn remote_offer(
        &mut self,
        friend_number: u32,
        index: u8,
        file_size: u64,
        filename: &[u8],
    ) -> Result<Event, ContractViolation> {
        let file_number = self.create(friend_number, FileDirection::Receive, index, file_size)?;
        Ok(Event::FileRecv {
            friend_number,
            file_number,
            kind: 0,
            file_size,
            filename: filename.to_vec(),
        })
    }

    /// The peer sent a control signal for one of our slots.
    pub(crate) fn remote_control(
        &mut self,
        friend_number: u32,
        receive_send: u8,
        index: u8,
        control: u8,
    ) -> Result<Event, ContractViolation> {
        let direction = if receive_send == legacy::NOTIFY_SENDING {
            FileDirection::Send
        } else {
            FileDirection::Receive
        };
        let file_number = FileId::unify(direction, index);
        let forwarded = match control {
            legacy::ACCEPT => FileControl::Resume,
            legacy::PAUSE => FileControl::Pause,
            legacy::KILL => FileControl::Cancel,
            legacy::FINISHED => {
                let transfer = self.entry_mut(friend_number, file_number)?;
                transfer.state = TransferState::Finished;
                let position = transfer.position;
                self.entries.remove(&(friend_number, file_number));
                return Ok(Event::FileChunkRequest {
                    friend_number,
                    file_number,
                    position,
                    length: 0,
                });
            }
            other => {
                return Err(ContractViolation::UnknownEnumValue {
                    kind: "legacy_file_control",
                    value: u32::from(other),
                });
            }
        };

        let transfer = self.entry_mut(friend_number, file_number)?;
        match forwarded {
            FileControl::Resume => transfer.state = TransferState::Running,
            FileControl::Pause => transfer.state = TransferState::Paused,
            FileControl::Cancel => {
                self.entries.remove(&(friend_number, file_number));
            }
        }
        Ok(Event::FileRecvControl {
            friend_number,
            file_number,
            control: forwarded,
        })
    }

    /// The peer delivered data on receive slot `index`.
    ///
    /// Returns the chunk event, followed by the end-of-file marker when the
    /// chunk completed the transfer.
    pub(crate) fn remote_data(
        &mut self,
        friend_number: u32,
        index: u8,
        data: &[u8],
    ) -> Result<Vec<Event>, ContractViolation> {
        let file_number = FileId::unify(FileDirection::Receive, index);
        let transfer = self.entry_mut(friend_number, file_number)?;
        let length = data.len() as u64;
        let position = transfer.position;
        if position + length > transfer.size {
            return Err(ContractViolation::TransferOverrun {
                friend_number,
                file_number,
                position,
                length,
                size: transfer.size,
            });
        }
        if transfer.state == TransferState::Paused {
            transfer.state = TransferState::Running;
        }
        transfer.position += length;

        let mut events = vec![Event::FileRecvChunk {
            friend_number,
            file_number,
            position,
            data: data.to_vec(),
        }];

        if transfer.position == transfer.size {
            transfer.state = TransferState::Finished;
            let size = transfer.size;
            self.entries.remove(&(friend_number, file_number));
            self.outbound.push(OutboundControl {
                friend_number,
                file_number,
                send_receive: legacy::CONTROL_RECEIVING,
                file_index: index,
                control: legacy::FINISHED,
            });
            events.push(Event::FileRecvChunk {
                friend_number,
                file_number,
                position: size,
                data: Vec::new(),
            });
        }
        Ok(events)
    }

    /// Controls queued for the engine since the last call.
    pub(crate) fn take_outbound(&mut self) -> Vec<OutboundControl> {
        std::mem::take(&mut self.outbound)
    }

    /// One chunk request for each running send transfer that has none
    /// outstanding and still has bytes to send.
    pub(crate) fn request_chunks(&mut self) -> Vec<Event> {
        self.entries
            .iter_mut()
            .filter(|(_, transfer)| {
                transfer.direction == FileDirection::Send
                    && transfer.state == TransferState::Running
                    && !transfer.request_pending
                    && transfer.position < transfer.size
            })
            .map(|(&(friend_number, file_number), transfer)| {
                transfer.request_pending = true;
                Event::FileChunkRequest {
                    friend_number,
                    file_number,
                    position: transfer.position,
                    length: legacy::MAX_CHUNK.min(transfer.size - transfer.position),
                }
            })
            .collect()
    }

    /// Record a transfer the caller started; `raw_index` is what the engine
    /// returned from `file_send`.
    pub(crate) fn local_send(
        &mut self,
        friend_number: u32,
        raw_index: u32,
        file_size: u64,
    ) -> Result<FileId, ContractViolation> {
        let index = u8::try_from(raw_index)
            .map_err(|_| ContractViolation::LegacyIndexOutOfRange { value: raw_index })?;
        self.create(friend_number, FileDirection::Send, index, file_size)
    }

    /// Legacy control to send for a caller-side control.
    pub(crate) fn resolve_control(
        &self,
        friend_number: u32,
        file_number: FileId,
        control: FileControl,
    ) -> Result<OutboundControl, FileControlError> {
        let (direction, file_index) = file_number.split().ok_or(FileControlError::NotFound)?;
        if self.get(friend_number, file_number).is_none() {
            return Err(FileControlError::NotFound);
        }
        let send_receive = match direction {
            FileDirection::Send => legacy::CONTROL_SENDING,
            FileDirection::Receive => legacy::CONTROL_RECEIVING,
        };
        Ok(OutboundControl {
            friend_number,
            file_number,
            send_receive,
            file_index,
            control: convert::file_control_to_legacy(control),
        })
    }

    /// Apply a caller-side control the engine accepted.
    pub(crate) fn commit_control(
        &mut self,
        friend_number: u32,
        file_number: FileId,
        control: FileControl,
    ) {
        let key = (friend_number, file_number);
        match control {
            FileControl::Cancel => {
                self.entries.remove(&key);
            }
            FileControl::Resume => {
                if let Some(transfer) = self.entries.get_mut(&key) {
                    transfer.state = TransferState::Running;
                }
            }
            FileControl::Pause => {
                if let Some(transfer) = self.entries.get_mut(&key) {
                    transfer.state = TransferState::Paused;
                }
            }
        }
    }

    /// Legacy slot to send a caller chunk on.
    pub(crate) fn resolve_chunk(
        &self,
        friend_number: u32,
        file_number: FileId,
        position: u64,
        length: u64,
    ) -> Result<u8, FileSendChunkError> {
        let (direction, file_index) = file_number.split().ok_or(FileSendChunkError::NotFound)?;
        if direction != FileDirection::Send {
            return Err(FileSendChunkError::NotFound);
        }
        let transfer = self
            .get(friend_number, file_number)
            .ok_or(FileSendChunkError::NotFound)?;
        if transfer.state != TransferState::Running {
            return Err(FileSendChunkError::NotTransferring);
        }
        if position != transfer.position {
            return Err(FileSendChunkError::WrongPosition);
        }
        if length > legacy::MAX_CHUNK || position + length > transfer.size {
            return Err(FileSendChunkError::InvalidLength);
        }
        Ok(file_index)
    }

    /// Advance a send transfer after the engine accepted a chunk.
    pub(crate) fn commit_chunk(&mut self, friend_number: u32, file_number: FileId, length: u64) {
        if let Some(transfer) = self.entries.get_mut(&(friend_number, file_number)) {
            transfer.position += length;
            transfer.request_pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRIEND: u32 = 4;

    fn receive_id(index: u8) -> FileId {
        FileId::unify(FileDirection::Receive, index)
    }

    fn send_id(index: u8) -> FileId {
        FileId::unify(FileDirection::Send, index)
    }

    #[test]
    fn remote_offer_creates_paused_receive_entry() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        let event = table.remote_offer(FRIEND, 2, 10, b"a.txt")?;
        assert_eq!(
            event,
            Event::FileRecv {
                friend_number: FRIEND,
                file_number: receive_id(2),
                kind: 0,
                file_size: 10,
                filename: b"a.txt".to_vec(),
            }
        );
        let transfer = table.get(FRIEND, receive_id(2)).cloned();
        assert_eq!(
            transfer.map(|transfer| (transfer.direction, transfer.state)),
            Some((FileDirection::Receive, TransferState::Paused))
        );
        Ok(())
    }

    #[test]
    fn duplicate_creation_is_contract_violation() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        table.remote_offer(FRIEND, 2, 10, b"a")?;
        assert_eq!(
            table.remote_offer(FRIEND, 2, 10, b"a"),
            Err(ContractViolation::DuplicateTransfer {
                friend_number: FRIEND,
                file_number: receive_id(2),
            })
        );
        Ok(())
    }

    #[test]
    fn data_completes_transfer_and_queues_finished() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        table.remote_offer(FRIEND, 1, 6, b"f")?;

        let first = table.remote_data(FRIEND, 1, b"abc")?;
        assert_eq!(first.len(), 1);
        assert_eq!(
            table.get(FRIEND, receive_id(1)).map(|t| (t.position, t.state)),
            Some((3, TransferState::Running))
        );
        assert!(table.take_outbound().is_empty());

        let last = table.remote_data(FRIEND, 1, b"def")?;
        assert_eq!(
            last,
            vec![
                Event::FileRecvChunk {
                    friend_number: FRIEND,
                    file_number: receive_id(1),
                    position: 3,
                    data: b"def".to_vec(),
                },
                Event::FileRecvChunk {
                    friend_number: FRIEND,
                    file_number: receive_id(1),
                    position: 6,
                    data: Vec::new(),
                },
            ]
        );
        assert!(table.is_empty());

        let outbound = table.take_outbound();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].control, legacy::FINISHED);
        assert_eq!(outbound[0].send_receive, legacy::CONTROL_RECEIVING);
        assert_eq!(outbound[0].file_index, 1);
        assert!(table.take_outbound().is_empty());
        Ok(())
    }

    #[test]
    fn overrun_and_missing_entries_are_contract_violations() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        assert_eq!(
            table.remote_data(FRIEND, 9, b"x"),
            Err(ContractViolation::MissingTransfer {
                friend_number: FRIEND,
                file_number: receive_id(9),
            })
        );

        table.remote_offer(FRIEND, 1, 2, b"f")?;
        assert_eq!(
            table.remote_data(FRIEND, 1, b"xyz"),
            Err(ContractViolation::TransferOverrun {
                friend_number: FRIEND,
                file_number: receive_id(1),
                position: 0,
                length: 3,
                size: 2,
            })
        );
        assert_eq!(table.get(FRIEND, receive_id(1)).map(|t| t.position), Some(0));
        Ok(())
    }

    #[test]
    fn finished_control_emits_zero_length_request_and_removes() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        let id = table.local_send(FRIEND, 0, 4)?;
        table.remote_control(FRIEND, legacy::NOTIFY_SENDING, 0, legacy::ACCEPT)?;
        table.commit_chunk(FRIEND, id, 4);

        let event = table.remote_control(FRIEND, legacy::NOTIFY_SENDING, 0, legacy::FINISHED)?;
        assert_eq!(
            event,
            Event::FileChunkRequest {
                friend_number: FRIEND,
                file_number: id,
                position: 4,
                length: 0,
            }
        );
        assert!(table.get(FRIEND, id).is_none());
        assert_eq!(
            table.remote_control(FRIEND, legacy::NOTIFY_SENDING, 0, legacy::FINISHED),
            Err(ContractViolation::MissingTransfer {
                friend_number: FRIEND,
                file_number: id,
            })
        );
        Ok(())
    }

    #[test]
    fn kill_control_cancels_and_removes() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        table.remote_offer(FRIEND, 3, 10, b"f")?;
        let event = table.remote_control(FRIEND, legacy::NOTIFY_RECEIVING, 3, legacy::KILL)?;
        assert_eq!(
            event,
            Event::FileRecvControl {
                friend_number: FRIEND,
                file_number: receive_id(3),
                control: FileControl::Cancel,
            }
        );
        assert!(table.is_empty());
        Ok(())
    }

    #[test]
    fn resume_broken_is_unknown_control() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        table.remote_offer(FRIEND, 3, 10, b"f")?;
        assert_eq!(
            table.remote_control(FRIEND, legacy::NOTIFY_RECEIVING, 3, legacy::RESUME_BROKEN),
            Err(ContractViolation::UnknownEnumValue {
                kind: "legacy_file_control",
                value: u32::from(legacy::RESUME_BROKEN),
            })
        );
        Ok(())
    }

    #[test]
    fn chunk_requests_are_issued_once_per_outstanding_request() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        let id = table.local_send(FRIEND, 0, 2_000)?;
        assert!(table.request_chunks().is_empty());

        table.remote_control(FRIEND, legacy::NOTIFY_SENDING, 0, legacy::ACCEPT)?;
        let requests = table.request_chunks();
        assert_eq!(
            requests,
            vec![Event::FileChunkRequest {
                friend_number: FRIEND,
                file_number: id,
                position: 0,
                length: legacy::MAX_CHUNK,
            }]
        );
        assert!(table.request_chunks().is_empty());

        table.commit_chunk(FRIEND, id, legacy::MAX_CHUNK);
        let requests = table.request_chunks();
        assert_eq!(
            requests,
            vec![Event::FileChunkRequest {
                friend_number: FRIEND,
                file_number: id,
                position: legacy::MAX_CHUNK,
                length: 2_000 - legacy::MAX_CHUNK,
            }]
        );

        table.commit_chunk(FRIEND, id, 2_000 - legacy::MAX_CHUNK);
        assert!(table.request_chunks().is_empty());
        Ok(())
    }

    #[test]
    fn caller_chunks_are_validated() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        let id = table.local_send(FRIEND, 5, 10)?;
        assert_eq!(
            table.resolve_chunk(FRIEND, id, 0, 4),
            Err(FileSendChunkError::NotTransferring)
        );
        table.commit_control(FRIEND, id, FileControl::Resume);
        assert_eq!(table.resolve_chunk(FRIEND, id, 0, 4), Ok(5));
        assert_eq!(
            table.resolve_chunk(FRIEND, id, 1, 4),
            Err(FileSendChunkError::WrongPosition)
        );
        assert_eq!(
            table.resolve_chunk(FRIEND, id, 0, 11),
            Err(FileSendChunkError::InvalidLength)
        );
        assert_eq!(
            table.resolve_chunk(FRIEND, receive_id(5), 0, 1),
            Err(FileSendChunkError::NotFound)
        );
        assert_eq!(
            table.resolve_chunk(FRIEND, FileId::from_raw(0x400), 0, 1),
            Err(FileSendChunkError::NotFound)
        );
        Ok(())
    }

    #[test]
    fn caller_controls_resolve_to_legacy_slots() -> anyhow::Result<()> {
        let mut table = TransferTable::new();
        table.remote_offer(FRIEND, 7, 10, b"f")?;
        let outbound = table.resolve_control(FRIEND, receive_id(7), FileControl::Resume);
        assert_eq!(
            outbound.map(|control| (control.send_receive, control.file_index, control.control)),
            Ok((legacy::CONTROL_RECEIVING, 7, legacy::ACCEPT))
        );
        assert_eq!(
            table
                .resolve_control(FRIEND, send_id(7), FileControl::Resume)
                .map(|control| control.control),
            Err(FileControlError::NotFound)
        );

        table.commit_control(FRIEND, receive_id(7), FileControl::Cancel);
        assert!(table.is_empty());
        Ok(())
    }

    #[test]
    fn local_send_rejects_wide_indices() {
        let mut table = TransferTable::new();
        assert_eq!(
            table.local_send(FRIEND, 256, 1),
            Err(ContractViolation::LegacyIndexOutOfRange { value: 256 })
        );
    }
}
