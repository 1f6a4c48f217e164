use crate::error::HashmailError;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

/// `uvarint(length) || payload` framing (§4.7). The reader reassembles a
/// frame by first reading the varint, then reading exactly that many
/// bytes — no coalescence, no splitting, regardless of how the underlying
/// pipe chunks the bytes.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = encode_uvarint(payload.len() as u64);
    out.extend_from_slice(payload);
    out
}

pub fn encode_uvarint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

/// Writes one frame to `writer`. Returns `Closed` if the pipe was closed
/// mid-write.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), HashmailError> {
    writer
        .write_all(&encode_frame(payload))
        .await
        .map_err(|_| HashmailError::Closed)
}

/// Reads one frame from `reader`. Returns `Closed` on a clean EOF before any
/// bytes of the next frame arrive, or `Malformed` if the stream ends
/// mid-frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, HashmailError> {
    let mut length: u64 = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        let n = reader
            .read(&mut byte)
            .await
            .map_err(|_| HashmailError::Closed)?;
        if n == 0 {
            if shift == 0 {
                return Err(HashmailError::Closed);
            }
            return Err(HashmailError::Malformed(
                "eof inside varint length".to_string(),
            ));
        }
        length |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(HashmailError::Malformed("varint too long".to_string()));
        }
    }

    let mut payload = vec![0u8; length as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| HashmailError::Malformed("eof inside frame payload".to_string()))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_arbitrary_payloads() {
        for payload in [
            Vec::new(),
            vec![0u8],
            vec![1u8; 200],
            (0..5000u32).map(|b| (b % 256) as u8).collect(),
        ] {
            let (mut client, mut server) = tokio::io::duplex(1024 * 64);
            write_frame(&mut client, &payload).await.unwrap();
            drop(client);
            let got = read_frame(&mut server).await.unwrap();
            assert_eq!(got, payload);
        }
    }

    #[tokio::test]
    async fn back_to_back_frames_do_not_coalesce() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"hello").await.unwrap();
        write_frame(&mut client, b"world").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap(), b"hello");
        assert_eq!(read_frame(&mut server).await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn clean_close_before_next_frame_is_closed_not_malformed() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);
        assert_eq!(read_frame(&mut server).await, Err(HashmailError::Closed));
    }
}
