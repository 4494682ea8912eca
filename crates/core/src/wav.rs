//! WAV container synthesis for telephony audio.
//!
//! The caller transport delivers G.711 mu-law at 8 kHz, mono, one byte per
//! sample. Transcription backends want a playable file, so the raw bytes are
//! wrapped in a fixed 44-byte RIFF header and passed through untouched.

/// Length of the RIFF/WAVE header written by [`ulaw_to_wav`].
pub const WAV_HEADER_LEN: usize = 44;
/// Sample rate of the caller transport's audio.
pub const SAMPLE_RATE: u32 = 8000;
/// WAVE format tag for G.711 mu-law.
pub const FORMAT_MULAW: u16 = 7;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 8;

const FMT_CHUNK_LEN: u32 = 16;

/// Wraps raw mu-law bytes in a WAV header.
///
/// The output is `WAV_HEADER_LEN + ulaw.len()` bytes long. The RIFF size field
/// at offset 4 holds `36 + len` and the data size field at offset 40 holds `len`.
pub fn ulaw_to_wav(ulaw: &[u8]) -> Vec<u8> {
    let data_len = ulaw.len() as u32;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = SAMPLE_RATE * u32::from(block_align);

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + ulaw.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    wav.extend_from_slice(&FORMAT_MULAW.to_le_bytes());
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(ulaw);
    wav
}
