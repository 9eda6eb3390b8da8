// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Erasure codes behind the FEC frameworks.
//!
//! A code sees a block of `k` equal-length source buffers (the frameworks
//! pad with zeros) at evaluation points `0..k` and produces repair buffers
//! at points `k..k + r`. The Reed-Solomon variant interpolates the unique
//! degree-`k-1` polynomial through any `k` known points, so every missing
//! source symbol is recoverable whenever at least `k` symbols are present.

use crate::fec::gf256;

/// The available codes; selection is fixed at construction time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Parity over the block; recovers a single loss
    Xor,
    /// Lagrange-interpolated Reed-Solomon over GF(256)
    ReedSolomon,
}

#[derive(Clone, Copy, Debug)]
pub enum ErasureCode {
    Xor,
    ReedSolomon,
}

impl ErasureCode {
    pub fn new(kind: Kind) -> Self {
        match kind {
            Kind::Xor => Self::Xor,
            Kind::ReedSolomon => Self::ReedSolomon,
        }
    }

    /// The most repair symbols the code can produce over `source_count`
    /// sources
    pub fn max_repair_symbols(&self, source_count: usize) -> usize {
        match self {
            Self::Xor => 1,
            // evaluation points share one byte of address space
            Self::ReedSolomon => 255usize.saturating_sub(source_count),
        }
    }

    /// Produces `repair_count` repair buffers over `sources`, which must
    /// all have the same length
    pub fn generate(&self, sources: &[&[u8]], repair_count: usize) -> Vec<Vec<u8>> {
        let repair_count = repair_count.min(self.max_repair_symbols(sources.len()));
        let symbol_size = sources.first().map_or(0, |source| source.len());
        debug_assert!(sources.iter().all(|source| source.len() == symbol_size));

        match self {
            Self::Xor => {
                let mut parity = vec![0u8; symbol_size];
                for source in sources {
                    for (parity, byte) in parity.iter_mut().zip(*source) {
                        *parity ^= byte;
                    }
                }
                vec![parity; repair_count.min(1)]
            }
            Self::ReedSolomon => {
                let k = sources.len();
                (0..repair_count)
                    .map(|j| {
                        let mut repair = vec![0u8; symbol_size];
                        let x = (k + j) as u8;
                        for (i, source) in sources.iter().enumerate() {
                            let coefficient = lagrange_at(i, x, &source_points(k));
                            gf256::mul_acc(&mut repair, source, coefficient);
                        }
                        repair
                    })
                    .collect()
            }
        }
    }

    /// Fills missing entries of `sources` from the present sources plus
    /// `repairs` (pairs of repair offset and buffer), recovering at most
    /// `max_recover` symbols. Returns the offsets recovered.
    pub fn recover(
        &self,
        total_source: usize,
        sources: &mut [Option<Vec<u8>>],
        repairs: &[(usize, &[u8])],
        max_recover: usize,
    ) -> Vec<usize> {
        debug_assert!(sources.len() >= total_source);

        let present: usize = sources.iter().filter(|slot| slot.is_some()).count();
        if present + repairs.len() < total_source {
            return Vec::new();
        }

        match self {
            Self::Xor => {
                let missing: Vec<usize> = (0..total_source)
                    .filter(|index| sources[*index].is_none())
                    .collect();
                if missing.len() != 1 || repairs.is_empty() {
                    return Vec::new();
                }
                let index = missing[0];
                let repair = repairs[0].1;

                let mut value = repair.to_vec();
                for source in sources.iter().flatten() {
                    for (value, byte) in value.iter_mut().zip(source) {
                        *value ^= byte;
                    }
                }
                sources[index] = Some(value);
                vec![index]
            }
            Self::ReedSolomon => {
                // interpolation basis: `total_source` known points,
                // sources first, then repairs
                let mut points = Vec::with_capacity(total_source);
                for (index, slot) in sources.iter().enumerate().take(total_source) {
                    if let Some(data) = slot {
                        points.push((index as u8, data.clone()));
                    }
                }
                for (offset, data) in repairs {
                    if points.len() >= total_source {
                        break;
                    }
                    points.push(((total_source + offset) as u8, data.to_vec()));
                }
                if points.len() < total_source {
                    return Vec::new();
                }

                let xs: Vec<u8> = points.iter().map(|(x, _)| *x).collect();
                let symbol_size = points[0].1.len();

                let mut recovered = Vec::new();
                for index in 0..total_source {
                    if sources[index].is_some() {
                        continue;
                    }
                    if recovered.len() >= max_recover {
                        break;
                    }

                    let mut value = vec![0u8; symbol_size];
                    for (basis_index, (_, data)) in points.iter().enumerate() {
                        let coefficient = lagrange_at(basis_index, index as u8, &xs);
                        gf256::mul_acc(&mut value, data, coefficient);
                    }
                    sources[index] = Some(value);
                    recovered.push(index);
                }
                recovered
            }
        }
    }
}

fn source_points(count: usize) -> Vec<u8> {
    (0..count as u8).collect()
}

/// Lagrange basis polynomial for `points[basis_index]`, evaluated at `x`
fn lagrange_at(basis_index: usize, x: u8, points: &[u8]) -> u8 {
    let x_i = points[basis_index];
    let mut value = 1u8;
    for (index, x_j) in points.iter().enumerate() {
        if index == basis_index {
            continue;
        }
        // subtraction in GF(256) is xor; the points are distinct so the
        // denominator is never zero
        value = gf256::mul(value, gf256::div(x ^ x_j, x_i ^ x_j));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sources(count: usize, size: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| (0..size).map(|j| (i * 31 + j * 7 + 3) as u8).collect())
            .collect()
    }

    #[test]
    fn xor_single_loss_test() {
        let code = ErasureCode::new(Kind::Xor);
        let sources = sample_sources(4, 32);
        let refs: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
        let repairs = code.generate(&refs, 1);
        assert_eq!(repairs.len(), 1);

        let mut slots: Vec<Option<Vec<u8>>> = sources.iter().cloned().map(Some).collect();
        slots[2] = None;

        let repair_refs: Vec<(usize, &[u8])> =
            repairs.iter().enumerate().map(|(j, r)| (j, r.as_slice())).collect();
        let recovered = code.recover(4, &mut slots, &repair_refs, 5);

        assert_eq!(recovered, vec![2]);
        assert_eq!(slots[2].as_deref(), Some(sources[2].as_slice()));
    }

    #[test]
    fn reed_solomon_recovers_any_two_losses_test() {
        let code = ErasureCode::new(Kind::ReedSolomon);
        let sources = sample_sources(5, 48);
        let refs: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
        let repairs = code.generate(&refs, 2);
        assert_eq!(repairs.len(), 2);

        for a in 0..5 {
            for b in (a + 1)..5 {
                let mut slots: Vec<Option<Vec<u8>>> =
                    sources.iter().cloned().map(Some).collect();
                slots[a] = None;
                slots[b] = None;

                let repair_refs: Vec<(usize, &[u8])> =
                    repairs.iter().enumerate().map(|(j, r)| (j, r.as_slice())).collect();
                let recovered = code.recover(5, &mut slots, &repair_refs, 5);

                assert_eq!(recovered, vec![a, b]);
                assert_eq!(slots[a].as_deref(), Some(sources[a].as_slice()));
                assert_eq!(slots[b].as_deref(), Some(sources[b].as_slice()));
            }
        }
    }

    #[test]
    fn reed_solomon_needs_k_symbols_test() {
        let code = ErasureCode::new(Kind::ReedSolomon);
        let sources = sample_sources(5, 16);
        let refs: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
        let repairs = code.generate(&refs, 1);

        let mut slots: Vec<Option<Vec<u8>>> = sources.iter().cloned().map(Some).collect();
        slots[0] = None;
        slots[1] = None;

        // 3 sources + 1 repair < 5: nothing can be recovered
        let repair_refs: Vec<(usize, &[u8])> =
            repairs.iter().enumerate().map(|(j, r)| (j, r.as_slice())).collect();
        let recovered = code.recover(5, &mut slots, &repair_refs, 5);
        assert!(recovered.is_empty());
        assert!(slots[0].is_none());
    }

    #[test]
    fn max_recover_cap_test() {
        let code = ErasureCode::new(Kind::ReedSolomon);
        let sources = sample_sources(6, 16);
        let refs: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
        let repairs = code.generate(&refs, 3);

        let mut slots: Vec<Option<Vec<u8>>> = sources.iter().cloned().map(Some).collect();
        slots[0] = None;
        slots[1] = None;
        slots[2] = None;

        let repair_refs: Vec<(usize, &[u8])> =
            repairs.iter().enumerate().map(|(j, r)| (j, r.as_slice())).collect();
        let recovered = code.recover(6, &mut slots, &repair_refs, 2);
        assert_eq!(recovered.len(), 2);
    }
}
