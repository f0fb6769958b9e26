use crate::DbError;

use bytecheck::CheckBytes;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, Deserialize, Infallible, Serialize};
use std::any::type_name;
use std::io::{Read, Write};

const SCRATCH_SPACE: usize = 4096;

/// Archives `value` with rkyv and wraps the archive in an LZ4 frame.
pub fn encode_record<T>(value: &T) -> Result<Vec<u8>, DbError>
where
    T: Serialize<AllocSerializer<SCRATCH_SPACE>>,
{
    let archived =
        rkyv::to_bytes::<_, SCRATCH_SPACE>(value).map_err(|e| DbError::Encode(e.to_string()))?;
    let mut encoder = FrameEncoder::new(Vec::with_capacity(archived.len() / 2));
    encoder.write_all(&archived)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`encode_record`]. The archive is validated before it is read, so arbitrary bytes produce an error rather
/// than undefined behavior.
pub fn decode_record<T>(bytes: &[u8]) -> Result<T, DbError>
where
    T: Archive,
    for<'a> T::Archived: CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut decoder = FrameDecoder::new(bytes);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;

    // The archive root must be aligned, which a plain Vec does not guarantee.
    let mut aligned = AlignedVec::with_capacity(raw.len());
    aligned.extend_from_slice(&raw);

    let archived = rkyv::check_archived_root::<T>(&aligned)
        .map_err(|_| DbError::Corrupt(format!("{} failed validation", type_name::<T>())))?;
    archived
        .deserialize(&mut Infallible)
        .map_err(|_| DbError::Corrupt(format!("{} failed to deserialize", type_name::<T>())))
}
