use bytes::Bytes;
use xpn_proto::request::EnvelopeHeader;
use xpn_proto::{WireStruct, MAX_MESSAGE_SIZE};
use xpn_types::{ClientRank, ClientTag};

use crate::comm::Comm;
use crate::error::NetError;

/// A request as received from the transport, before opcode decoding.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub rank: ClientRank,
    pub header: EnvelopeHeader,
    pub payload: Bytes,
}

impl Envelope {
    pub fn tag(&self) -> ClientTag {
        self.header.tag
    }
}

/// Read one envelope header and its payload.
///
/// The payload size is checked against `MAX_MESSAGE_SIZE` before any buffer
/// is allocated for it.
pub async fn read_envelope<C: Comm + ?Sized>(comm: &C) -> Result<Envelope, NetError> {
    let rank = comm.rank();
    let mut head = [0u8; EnvelopeHeader::WIRE_SIZE];
    comm.read_data(&mut head, rank, ClientTag(0)).await?;
    let header = EnvelopeHeader::from_exact(&head)?;

    let size = header.msg_size as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut payload = vec![0u8; size];
    if size > 0 {
        comm.read_data(&mut payload, rank, header.tag).await?;
    }
    Ok(Envelope {
        rank,
        header,
        payload: Bytes::from(payload),
    })
}

/// Encode a reply struct and write it to the client.
pub async fn write_struct<C, T>(
    comm: &C,
    value: &T,
    rank: ClientRank,
    tag: ClientTag,
) -> Result<(), NetError>
where
    C: Comm + ?Sized,
    T: WireStruct + Sync,
{
    let bytes = value.to_bytes();
    comm.write_data(&bytes, rank, tag).await
}

/// Read exactly one reply struct. Used by clients and tests.
pub async fn read_struct<C, T>(comm: &C, rank: ClientRank, tag: ClientTag) -> Result<T, NetError>
where
    C: Comm + ?Sized,
    T: WireStruct,
{
    let mut buf = vec![0u8; T::WIRE_SIZE];
    comm.read_data(&mut buf, rank, tag).await?;
    Ok(T::from_exact(&buf)?)
}
