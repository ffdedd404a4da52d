//! A minimal uncompressed frame-dump reader standing in for a real video
//! decoder, which is an out-of-scope collaborator (§1 non-goals: no codec
//! implementation). Format: an 8-byte little-endian `(width: u32, height:
//! u32)` header, followed by consecutive `width*height*3`-byte BGR frames
//! until EOF.

use std::io::Read;
use std::path::Path;

use super::source::RawFrame;

pub fn load_raw_frames(path: &Path) -> std::io::Result<Vec<RawFrame>> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;
    let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let frame_bytes = (width as usize) * (height as usize) * 3;

    let mut frames = Vec::new();
    let mut buf = vec![0u8; frame_bytes];
    loop {
        match file.read_exact(&mut buf) {
            Ok(()) => frames.push(RawFrame { pixels: buf.clone(), width, height }),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(frames)
}

pub fn write_raw_frames(path: &Path, frames: &[RawFrame]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)?;
    let (width, height) = frames.first().map(|f| (f.width, f.height)).unwrap_or((0, 0));
    file.write_all(&width.to_le_bytes())?;
    file.write_all(&height.to_le_bytes())?;
    for frame in frames {
        file.write_all(&frame.pixels)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_frames_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.rawvideo");
        let frames = vec![
            RawFrame { pixels: vec![1u8; 2 * 2 * 3], width: 2, height: 2 },
            RawFrame { pixels: vec![2u8; 2 * 2 * 3], width: 2, height: 2 },
        ];
        write_raw_frames(&path, &frames).unwrap();
        let loaded = load_raw_frames(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].pixels, frames[0].pixels);
        assert_eq!(loaded[1].pixels, frames[1].pixels);
    }
}
