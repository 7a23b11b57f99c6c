//! Steim-1 compression, 64-byte frames of first differences packed as four
//! 8-bit, two 16-bit or one 32-bit value per work slot.
//!
//! Reference material in Appendix B of the SEED Reference Manual, 2nd Ed.,
//! pp. 119-125. Steim compression scheme copyrighted by Dr. Joseph Steim.

use log::warn;

use crate::byte_order::ByteOrder;
use crate::mseed_error::MSeedError;
use crate::steim_frame_block::{SteimFrame, SteimFrameBlock, FRAME_LEN, WORDS_PER_FRAME};

pub fn ok_i8(v: i32) -> bool {
    (-128..=127).contains(&v)
}

pub fn ok_i16(v: i32) -> bool {
    (-32768..=32767).contains(&v)
}

/// Decode up to `num_samples` from the Steim-1 frames in `buf`. Trailing
/// bytes beyond a whole frame are ignored. The reconstruction starts from
/// the forward integration constant X0 in the first frame; the final sample
/// is checked against the reverse constant XN with a warning on mismatch.
pub fn decode(buf: &[u8], num_samples: usize, order: ByteOrder) -> Result<Vec<i32>, MSeedError> {
    if num_samples == 0 || buf.len() < FRAME_LEN {
        return Ok(Vec::new());
    }
    let num_frames = buf.len() / FRAME_LEN;
    let x0 = order.read_i32(&buf[4..8]);
    let xn = order.read_i32(&buf[8..12]);

    let mut diffs: Vec<i32> = Vec::with_capacity(num_samples);
    'frames: for fr in 0..num_frames {
        let base = fr * FRAME_LEN;
        let ctrl = order.read_u32(&buf[base..base + 4]);
        for wn in 0..WORDS_PER_FRAME {
            if diffs.len() >= num_samples {
                break 'frames;
            }
            let tag = (ctrl >> (2 * (WORDS_PER_FRAME - 1 - wn))) & 0x3;
            let off = base + 4 + 4 * wn;
            match tag {
                0 => {} // special, headers and integration constants
                1 => {
                    for i in 0..4 {
                        if diffs.len() >= num_samples {
                            break;
                        }
                        diffs.push(buf[off + i] as i8 as i32);
                    }
                }
                2 => {
                    for i in 0..2 {
                        if diffs.len() >= num_samples {
                            break;
                        }
                        diffs.push(order.read_i16(&buf[off + 2 * i..off + 2 * i + 2]) as i32);
                    }
                }
                3 => {
                    diffs.push(order.read_i32(&buf[off..off + 4]));
                }
                _ => unreachable!(),
            }
        }
    }

    if diffs.len() != num_samples {
        warn!(
            "Steim-1: number of samples indicated in header ({}) does not equal data ({})",
            num_samples,
            diffs.len()
        );
    }

    // First sample is X0 itself, the first difference is skipped.
    let mut samples = Vec::with_capacity(diffs.len());
    if !diffs.is_empty() {
        let mut last = x0;
        samples.push(x0);
        for &d in diffs.iter().skip(1) {
            last = last.wrapping_add(d);
            samples.push(last);
        }
        if last != xn {
            warn!(
                "Steim-1 data integrity check failed, last sample {} != XN {}",
                last, xn
            );
        }
    }
    Ok(samples)
}

/// Encode samples into at most `max_frames` Steim-1 frames. The first two
/// work slots of the first frame carry the X0 and XN integration constants.
/// Packing is greedy: four byte-size differences, else two halfword-size,
/// else one fullword. Returns the frame block with `num_samples` set to the
/// count actually packed, which is less than `samples.len()` when the frame
/// budget fills first.
pub fn encode(
    samples: &[i32],
    max_frames: usize,
    order: ByteOrder,
) -> Result<SteimFrameBlock, MSeedError> {
    if samples.is_empty() {
        return Err(MSeedError::OutOfRange(String::from(
            "no samples for Steim-1 encoding",
        )));
    }
    if max_frames == 0 {
        return Err(MSeedError::OutOfRange(String::from(
            "no frames for Steim-1 encoding",
        )));
    }
    let diffs: Vec<i32> = std::iter::once(0)
        .chain(samples.windows(2).map(|w| w[1].wrapping_sub(w[0])))
        .collect();

    let mut block = SteimFrameBlock::new(1, order);
    let mut frame = SteimFrame::new();
    frame.push_slot(order.i32_bytes(samples[0]), 0); // X0
    frame.push_slot([0; 4], 0); // XN, patched below

    let mut idx = 0;
    loop {
        while !frame.is_full() && idx < samples.len() {
            let remaining = samples.len() - idx;
            if remaining >= 4 && diffs[idx..idx + 4].iter().all(|&d| ok_i8(d)) {
                let b = [
                    diffs[idx] as i8 as u8,
                    diffs[idx + 1] as i8 as u8,
                    diffs[idx + 2] as i8 as u8,
                    diffs[idx + 3] as i8 as u8,
                ];
                frame.push_slot(b, 1);
                idx += 4;
            } else if remaining >= 2 && ok_i16(diffs[idx]) && ok_i16(diffs[idx + 1]) {
                let mut b = [0u8; 4];
                order.write_i16(&mut b[0..2], diffs[idx] as i16);
                order.write_i16(&mut b[2..4], diffs[idx + 1] as i16);
                frame.push_slot(b, 2);
                idx += 2;
            } else {
                frame.push_slot(order.i32_bytes(diffs[idx]), 3);
                idx += 1;
            }
        }
        block.frames.push(frame);
        if idx >= samples.len() || block.frames.len() >= max_frames {
            break;
        }
        frame = SteimFrame::new();
    }

    block.num_samples = idx;
    block.set_xn(samples[idx - 1]);
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_widths() {
        assert!(ok_i8(-128) && ok_i8(127) && !ok_i8(128));
        assert!(ok_i16(-32768) && ok_i16(32767) && !ok_i16(40000));
    }

    #[test]
    fn data_round_trip() {
        let data = [1, -1, -1, -1, 200, -300, 16000, -18000, 20000, -40000];
        let block = encode(&data, 63, ByteOrder::Big).unwrap();
        assert_eq!(block.num_samples, data.len());
        assert_ne!(block.frames.len(), 0);
        let bytes = block.to_bytes();
        // X0 is the first sample
        assert_eq!(ByteOrder::Big.read_i32(&bytes[4..8]), 1);
        // XN is the last
        assert_eq!(ByteOrder::Big.read_i32(&bytes[8..12]), -40000);
        let rt = decode(&bytes, data.len(), ByteOrder::Big).unwrap();
        assert_eq!(rt, data);
    }

    #[test]
    fn little_endian_round_trip() {
        let data = [5, 6, 1000, -70000, 3, 3, 3, 3];
        let block = encode(&data, 63, ByteOrder::Little).unwrap();
        let bytes = block.to_bytes();
        let rt = decode(&bytes, data.len(), ByteOrder::Little).unwrap();
        assert_eq!(rt, data);
    }

    #[test]
    fn frame_budget_truncates() {
        // one frame holds at most 13 data words after X0/XN, 52 byte diffs
        let data = vec![1i32; 500];
        let block = encode(&data, 1, ByteOrder::Big).unwrap();
        assert_eq!(block.frames.len(), 1);
        assert_eq!(block.num_samples, 52);
        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), 64);
        let rt = decode(&bytes, block.num_samples, ByteOrder::Big).unwrap();
        assert_eq!(rt, vec![1i32; 52]);
    }

    #[test]
    fn multi_frame() {
        let data: Vec<i32> = (0..200).map(|i| (i * 37) % 1000 - 500).collect();
        let block = encode(&data, 63, ByteOrder::Big).unwrap();
        assert_eq!(block.num_samples, data.len());
        assert!(block.frames.len() > 1);
        let rt = decode(&block.to_bytes(), data.len(), ByteOrder::Big).unwrap();
        assert_eq!(rt, data);
    }

    #[test]
    fn handcrafted_frame() {
        // one frame: X0=10, XN=13, one byte-diff word [0, 1, 1, 1]
        let mut buf = vec![0u8; 64];
        let ctrl: u32 = 1 << (2 * (15 - 1 - 2)); // tag 1 on data word 2
        ByteOrder::Big.write_u32(&mut buf[0..4], ctrl);
        ByteOrder::Big.write_i32(&mut buf[4..8], 10);
        ByteOrder::Big.write_i32(&mut buf[8..12], 13);
        buf[12..16].copy_from_slice(&[0, 1, 1, 1]);
        let out = decode(&buf, 4, ByteOrder::Big).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13]);
    }
}
