//! Steim-2 compression. Same 64-byte frame structure as Steim-1 but with
//! two packed work slot modes selected by a 2-bit discriminator in the slot
//! itself: tag 10 holds one 30-bit, two 15-bit or three 10-bit differences,
//! tag 11 holds five 6-bit, six 5-bit or seven 4-bit differences.

use log::warn;

use crate::byte_order::ByteOrder;
use crate::mseed_error::MSeedError;
use crate::steim1::ok_i8;
use crate::steim_frame_block::{SteimFrame, SteimFrameBlock, FRAME_LEN, WORDS_PER_FRAME};

/// Does the difference fit a signed value of the given bit width?
fn fits(d: i32, bits: u32) -> bool {
    let lim = 1i32 << (bits - 1);
    d >= -lim && d < lim
}

/// Mask `count` differences of `bits` width out of a packed work word,
/// sign extending each via the width's top bit.
fn unpack_word(val: i32, bits: u32, count: usize, out: &mut Vec<i32>, limit: usize) {
    let m1 = (1i32 << bits) - 1; // low bit mask
    let m2 = 1i32 << (bits - 1); // sign bit
    for i in (0..count).rev() {
        if out.len() >= limit {
            break;
        }
        let mut d = (val >> (i as u32 * bits)) & m1;
        if d & m2 != 0 {
            d |= !m1;
        }
        out.push(d);
    }
}

/// Pack `count` differences of `bits` width into a work word below the
/// 2-bit discriminator `dnib`.
fn pack_word(diffs: &[i32], bits: u32, dnib: u32) -> u32 {
    let m1 = (1u32 << bits) - 1;
    let mut val = dnib << 30;
    for (i, &d) in diffs.iter().enumerate() {
        val |= (d as u32 & m1) << ((diffs.len() - 1 - i) as u32 * bits);
    }
    val
}

/// Decode up to `num_samples` from the Steim-2 frames in `buf`, with the
/// same X0/XN handling and integrity warnings as Steim-1.
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
                    let val = order.read_i32(&buf[off..off + 4]);
                    let dnib = (val >> 30) & 0x3;
                    let (bits, n) = match dnib {
                        1 => (30, 1),
                        2 => (15, 2),
                        3 => (10, 3),
                        _ => {
                            return Err(MSeedError::SteimBadFlag {
                                version: 2,
                                frame: fr,
                                word: wn,
                                flag: dnib as u8,
                            })
                        }
                    };
                    unpack_word(val, bits, n, &mut diffs, num_samples);
                }
                3 => {
                    let val = order.read_i32(&buf[off..off + 4]);
                    let dnib = (val >> 30) & 0x3;
                    let (bits, n) = match dnib {
                        0 => (6, 5),
                        1 => (5, 6),
                        2 => (4, 7),
                        _ => {
                            return Err(MSeedError::SteimBadFlag {
                                version: 2,
                                frame: fr,
                                word: wn,
                                flag: dnib as u8,
                            })
                        }
                    };
                    unpack_word(val, bits, n, &mut diffs, num_samples);
                }
                _ => unreachable!(),
            }
        }
    }

    if diffs.len() != num_samples {
        warn!(
            "Steim-2: number of samples indicated in header ({}) does not equal data ({})",
            num_samples,
            diffs.len()
        );
    }

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
                "Steim-2 data integrity check failed, last sample {} != XN {}",
                last, xn
            );
        }
    }
    Ok(samples)
}

/// Encode samples into at most `max_frames` Steim-2 frames. Greedy packing
/// tries the densest grouping the pending differences allow: 7x4, 6x5, 5x6,
/// 4x8, 3x10, 2x15 then 1x30 bits. A difference beyond 30 bits cannot be
/// represented and is an error.
pub fn encode(
    samples: &[i32],
    max_frames: usize,
    order: ByteOrder,
) -> Result<SteimFrameBlock, MSeedError> {
    if samples.is_empty() {
        return Err(MSeedError::OutOfRange(String::from(
            "no samples for Steim-2 encoding",
        )));
    }
    if max_frames == 0 {
        return Err(MSeedError::OutOfRange(String::from(
            "no frames for Steim-2 encoding",
        )));
    }
    let diffs: Vec<i32> = std::iter::once(0)
        .chain(samples.windows(2).map(|w| w[1].wrapping_sub(w[0])))
        .collect();

    let mut block = SteimFrameBlock::new(2, order);
    let mut frame = SteimFrame::new();
    frame.push_slot(order.i32_bytes(samples[0]), 0); // X0
    frame.push_slot([0; 4], 0); // XN, patched below

    let mut idx = 0;
    loop {
        while !frame.is_full() && idx < samples.len() {
            let pending = &diffs[idx..];
            if pending.len() >= 7 && pending[..7].iter().all(|&d| fits(d, 4)) {
                frame.push_slot(order.u32_bytes(pack_word(&pending[..7], 4, 2)), 3);
                idx += 7;
            } else if pending.len() >= 6 && pending[..6].iter().all(|&d| fits(d, 5)) {
                frame.push_slot(order.u32_bytes(pack_word(&pending[..6], 5, 1)), 3);
                idx += 6;
            } else if pending.len() >= 5 && pending[..5].iter().all(|&d| fits(d, 6)) {
                frame.push_slot(order.u32_bytes(pack_word(&pending[..5], 6, 0)), 3);
                idx += 5;
            } else if pending.len() >= 4 && pending[..4].iter().all(|&d| ok_i8(d)) {
                let b = [
                    pending[0] as i8 as u8,
                    pending[1] as i8 as u8,
                    pending[2] as i8 as u8,
                    pending[3] as i8 as u8,
                ];
                frame.push_slot(b, 1);
                idx += 4;
            } else if pending.len() >= 3 && pending[..3].iter().all(|&d| fits(d, 10)) {
                frame.push_slot(order.u32_bytes(pack_word(&pending[..3], 10, 3)), 2);
                idx += 3;
            } else if pending.len() >= 2 && pending[..2].iter().all(|&d| fits(d, 15)) {
                frame.push_slot(order.u32_bytes(pack_word(&pending[..2], 15, 2)), 2);
                idx += 2;
            } else if fits(pending[0], 30) {
                frame.push_slot(order.u32_bytes(pack_word(&pending[..1], 30, 1)), 2);
                idx += 1;
            } else {
                return Err(MSeedError::SteimOverflow(2));
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
    fn width_fits() {
        assert!(fits(7, 4) && !fits(8, 4) && fits(-8, 4) && !fits(-9, 4));
        assert!(fits(536_870_911, 30) && !fits(536_870_912, 30));
    }

    #[test]
    fn pack_unpack_word() {
        let diffs = [-3, 1, 0, 2, -1, 3, -4];
        let val = pack_word(&diffs, 4, 2) as i32;
        assert_eq!((val >> 30) & 0x3, 2);
        let mut out = Vec::new();
        unpack_word(val, 4, 7, &mut out, 100);
        assert_eq!(out, diffs);
    }

    #[test]
    fn data_round_trip() {
        let data = [
            1, -1, -1, -1, 200, -300, 16000, -18000, 20000, -40000, 3_000_000, -3_000_000, 5, 5, 5,
        ];
        let block = encode(&data, 63, ByteOrder::Big).unwrap();
        assert_eq!(block.num_samples, data.len());
        let bytes = block.to_bytes();
        assert_eq!(ByteOrder::Big.read_i32(&bytes[4..8]), 1);
        assert_eq!(ByteOrder::Big.read_i32(&bytes[8..12]), 5);
        let rt = decode(&bytes, data.len(), ByteOrder::Big).unwrap();
        assert_eq!(rt, data);
    }

    #[test]
    fn all_width_classes_round_trip() {
        // runs exercising each packed mode
        let mut data: Vec<i32> = Vec::new();
        let mut acc = 0i32;
        for (step, count) in [
            (3, 14),         // 4-bit
            (12, 12),        // 5-bit
            (25, 10),        // 6-bit
            (100, 8),        // 8-bit
            (400, 6),        // 10-bit
            (12000, 4),      // 15-bit
            (200_000_000, 3) // 30-bit
        ] {
            for i in 0..count {
                acc = if i % 2 == 0 {
                    acc.wrapping_add(step)
                } else {
                    acc.wrapping_sub(step / 2)
                };
                data.push(acc);
            }
        }
        let block = encode(&data, 63, ByteOrder::Big).unwrap();
        assert_eq!(block.num_samples, data.len());
        let rt = decode(&block.to_bytes(), data.len(), ByteOrder::Big).unwrap();
        assert_eq!(rt, data);
    }

    #[test]
    fn little_endian_round_trip() {
        let data = [7, 6, 5, 1000, -1000, 123_456, 7];
        let block = encode(&data, 63, ByteOrder::Little).unwrap();
        let rt = decode(&block.to_bytes(), data.len(), ByteOrder::Little).unwrap();
        assert_eq!(rt, data);
    }

    #[test]
    fn overflow_rejected() {
        // difference between successive samples exceeds 30 bits
        let data = [0, 1_500_000_000];
        assert!(matches!(
            encode(&data, 63, ByteOrder::Big),
            Err(MSeedError::SteimOverflow(2))
        ));
    }

    #[test]
    fn bad_dnib_rejected() {
        let mut buf = vec![0u8; 64];
        // tag 2 on data word 2 with dnib 0 is invalid
        let ctrl: u32 = 2 << (2 * (15 - 1 - 2));
        ByteOrder::Big.write_u32(&mut buf[0..4], ctrl);
        assert!(matches!(
            decode(&buf, 4, ByteOrder::Big),
            Err(MSeedError::SteimBadFlag { version: 2, .. })
        ));
    }
}
