//! PSRP message envelope.
//!
//! Every PSRP exchange is a [`Message`]: routing metadata (direction,
//! message type, pool and pipeline GUIDs) plus the serialized CLIXML
//! payload. The envelope is a fixed 40-byte little-endian header followed
//! by the payload bytes; GUIDs use the .NET mixed-endian field layout.

use crate::config::{MESSAGE_HEADER_SIZE, UTF8_BOM};
use crate::error::{PsrpError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which peer a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Destination {
    Client = 0x0000_0001,
    Server = 0x0000_0002,
}

impl TryFrom<u32> for Destination {
    type Error = PsrpError;

    fn try_from(code: u32) -> Result<Self> {
        match code {
            0x0000_0001 => Ok(Destination::Client),
            0x0000_0002 => Ok(Destination::Server),
            other => Err(PsrpError::UnknownDestination(other)),
        }
    }
}

/// PSRP message types (MS-PSRP §2.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    SessionCapability = 0x0001_0002,
    InitRunspacePool = 0x0001_0004,
    PublicKey = 0x0001_0005,
    EncryptedSessionKey = 0x0001_0006,
    PublicKeyRequest = 0x0001_0007,
    ConnectRunspacePool = 0x0001_0008,
    SetMaxRunspaces = 0x0002_1002,
    SetMinRunspaces = 0x0002_1003,
    RunspaceAvailability = 0x0002_1004,
    RunspacePoolState = 0x0002_1005,
    CreatePipeline = 0x0002_1006,
    GetAvailableRunspaces = 0x0002_1007,
    UserEvent = 0x0002_1008,
    ApplicationPrivateData = 0x0002_1009,
    GetCommandMetadata = 0x0002_100A,
    RunspacePoolInitData = 0x0002_100B,
    ResetRunspaceState = 0x0002_100C,
    RunspacePoolHostCall = 0x0002_1100,
    RunspacePoolHostResponse = 0x0002_1101,
    PipelineInput = 0x0004_1002,
    EndOfPipelineInput = 0x0004_1003,
    PipelineOutput = 0x0004_1004,
    ErrorRecord = 0x0004_1005,
    PipelineState = 0x0004_1006,
    DebugRecord = 0x0004_1007,
    VerboseRecord = 0x0004_1008,
    WarningRecord = 0x0004_1009,
    ProgressRecord = 0x0004_1010,
    InformationRecord = 0x0004_1011,
    PipelineHostCall = 0x0004_1100,
    PipelineHostResponse = 0x0004_1101,
}

impl MessageType {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MessageType {
    type Error = PsrpError;

    fn try_from(code: u32) -> Result<Self> {
        let message_type = match code {
            0x0001_0002 => MessageType::SessionCapability,
            0x0001_0004 => MessageType::InitRunspacePool,
            0x0001_0005 => MessageType::PublicKey,
            0x0001_0006 => MessageType::EncryptedSessionKey,
            0x0001_0007 => MessageType::PublicKeyRequest,
            0x0001_0008 => MessageType::ConnectRunspacePool,
            0x0002_1002 => MessageType::SetMaxRunspaces,
            0x0002_1003 => MessageType::SetMinRunspaces,
            0x0002_1004 => MessageType::RunspaceAvailability,
            0x0002_1005 => MessageType::RunspacePoolState,
            0x0002_1006 => MessageType::CreatePipeline,
            0x0002_1007 => MessageType::GetAvailableRunspaces,
            0x0002_1008 => MessageType::UserEvent,
            0x0002_1009 => MessageType::ApplicationPrivateData,
            0x0002_100A => MessageType::GetCommandMetadata,
            0x0002_100B => MessageType::RunspacePoolInitData,
            0x0002_100C => MessageType::ResetRunspaceState,
            0x0002_1100 => MessageType::RunspacePoolHostCall,
            0x0002_1101 => MessageType::RunspacePoolHostResponse,
            0x0004_1002 => MessageType::PipelineInput,
            0x0004_1003 => MessageType::EndOfPipelineInput,
            0x0004_1004 => MessageType::PipelineOutput,
            0x0004_1005 => MessageType::ErrorRecord,
            0x0004_1006 => MessageType::PipelineState,
            0x0004_1007 => MessageType::DebugRecord,
            0x0004_1008 => MessageType::VerboseRecord,
            0x0004_1009 => MessageType::WarningRecord,
            0x0004_1010 => MessageType::ProgressRecord,
            0x0004_1011 => MessageType::InformationRecord,
            0x0004_1100 => MessageType::PipelineHostCall,
            0x0004_1101 => MessageType::PipelineHostResponse,
            other => return Err(PsrpError::UnknownMessageType(other)),
        };
        Ok(message_type)
    }
}

/// A routed PSRP message: envelope metadata plus serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub destination: Destination,
    pub message_type: MessageType,
    pub runspace_pool_id: Uuid,
    /// Absent for pool-level messages; all-zero GUID on the wire.
    pub pipeline_id: Option<Uuid>,
    pub data: Bytes,
}

impl Message {
    pub fn new(
        destination: Destination,
        message_type: MessageType,
        runspace_pool_id: Uuid,
        pipeline_id: Option<Uuid>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            destination,
            message_type,
            runspace_pool_id,
            pipeline_id,
            data: data.into(),
        }
    }

    /// Encode the 40-byte envelope header followed by the payload.
    pub fn pack(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + self.data.len());
        buf.put_u32_le(self.destination as u32);
        buf.put_u32_le(self.message_type.code());
        buf.put_slice(&self.runspace_pool_id.to_bytes_le());
        buf.put_slice(&self.pipeline_id.unwrap_or_else(Uuid::nil).to_bytes_le());
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode an envelope; strips a UTF-8 BOM from the payload start when
    /// present.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(PsrpError::BufferTooSmall {
                needed: MESSAGE_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let destination =
            Destination::try_from(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))?;
        let message_type =
            MessageType::try_from(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]))?;

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&buf[8..24]);
        let runspace_pool_id = Uuid::from_bytes_le(guid);

        guid.copy_from_slice(&buf[24..40]);
        let pipeline = Uuid::from_bytes_le(guid);
        let pipeline_id = (!pipeline.is_nil()).then_some(pipeline);

        let mut payload = &buf[MESSAGE_HEADER_SIZE..];
        if payload.starts_with(&UTF8_BOM) {
            payload = &payload[UTF8_BOM.len()..];
        }

        Ok(Self {
            destination,
            message_type,
            runspace_pool_id,
            pipeline_id,
            data: Bytes::copy_from_slice(payload),
        })
    }
}
