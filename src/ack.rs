//! ACK 범위 스케줄러
//!
//! 수신한 인덱스 전체(R)와 이번에 확인해줘야 할 부분집합(Q)을 받아
//! 백채널에 실을 최소 범위 목록을 만듦.
//!
//! 1. Q의 각 시드에서 R을 따라 좌우로 flood-fill → 시드가 속한 연속 구간 전체
//! 2. 모은 인덱스를 정렬해 연속 구간 [start, end]로 압축
//! 3. 첫 구간이 0에서 시작하고 마지막 구간이 total-1에서 끝나면 wrap-around 하나로 병합
//!
//! 인덱스 공간은 원형 (total-1 다음이 0). 이미 확인된 인덱스가 다시 실릴 수 있지만
//! 수신 집합이 아무리 조각나도 범위 목록은 짧게 유지됨.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkIndex;

/// ACK 범위 (양끝 포함)
///
/// `start <= end`면 일반 범위, `start > end`면 `start..total-1` 다음 `0..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AckRange {
    pub start: ChunkIndex,
    pub end: ChunkIndex,
}

impl AckRange {
    pub fn new(start: ChunkIndex, end: ChunkIndex) -> Self {
        Self { start, end }
    }

    pub fn is_wrapping(&self) -> bool {
        self.start > self.end
    }

    /// 범위가 덮는 인덱스 (total 밖은 제외)
    pub fn indices(&self, total: u32) -> impl Iterator<Item = ChunkIndex> {
        let end = self.end.saturating_add(1).min(total);
        let (head, tail) = if self.is_wrapping() {
            (self.start..total, 0..end)
        } else {
            (self.start..end, 0..0)
        };
        head.chain(tail)
    }

    pub fn as_pair(&self) -> (u32, u32) {
        (self.start, self.end)
    }
}

impl From<(u32, u32)> for AckRange {
    fn from((start, end): (u32, u32)) -> Self {
        Self { start, end }
    }
}

/// 범위 목록을 정확한 인덱스 집합으로 펼침
pub fn expand(ranges: &[AckRange], total: u32) -> BTreeSet<ChunkIndex> {
    ranges.iter().flat_map(|r| r.indices(total)).collect()
}

/// flood-fill 후 압축
///
/// `requested`에서 `received`에 없는 시드는 무시함.
pub fn schedule(
    received: &BTreeSet<ChunkIndex>,
    requested: &BTreeSet<ChunkIndex>,
    total: u32,
) -> Vec<AckRange> {
    if total == 0 {
        return Vec::new();
    }

    let mut working = BTreeSet::new();

    for &seed in requested {
        if seed >= total || !received.contains(&seed) || working.contains(&seed) {
            continue;
        }

        let mut start = seed;
        let mut len = 1;
        while len < total {
            let prev = if start == 0 { total - 1 } else { start - 1 };
            if !received.contains(&prev) {
                break;
            }
            start = prev;
            len += 1;
        }

        let mut end = seed;
        while len < total {
            let next = if end + 1 == total { 0 } else { end + 1 };
            if !received.contains(&next) {
                break;
            }
            end = next;
            len += 1;
        }

        let mut index = start;
        for _ in 0..len {
            working.insert(index);
            index = if index + 1 == total { 0 } else { index + 1 };
        }
    }

    compress(&working, total)
}

/// 정렬된 인덱스 → 최소 연속 범위 (+ wrap-around 병합)
fn compress(indices: &BTreeSet<ChunkIndex>, total: u32) -> Vec<AckRange> {
    let mut ranges: Vec<AckRange> = Vec::new();

    for &index in indices {
        match ranges.last_mut() {
            Some(last) if last.end + 1 == index => last.end = index,
            _ => ranges.push(AckRange::new(index, index)),
        }
    }

    if ranges.len() >= 2 {
        let first = ranges[0];
        let last = ranges[ranges.len() - 1];
        if first.start == 0 && last.end == total - 1 {
            ranges.pop();
            ranges[0] = AckRange::new(last.start, first.end);
        }
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u32]) -> BTreeSet<u32> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_wrap_around_single_range() {
        let received = set(&[8, 9, 0, 1]);
        let ranges = schedule(&received, &received, 10);
        assert_eq!(ranges, vec![AckRange::new(8, 1)]);
        assert_eq!(expand(&ranges, 10), received);

        // 시드 하나만 요청해도 원형으로 연결된 구간 전체를 확인
        assert_eq!(schedule(&received, &set(&[9]), 10), vec![AckRange::new(8, 1)]);
    }

    #[test]
    fn test_flood_fill_acknowledges_whole_run() {
        let received = set(&[2, 3, 4, 5, 7, 8]);
        assert_eq!(schedule(&received, &set(&[4]), 10), vec![AckRange::new(2, 5)]);
        assert_eq!(
            schedule(&received, &set(&[3, 8]), 10),
            vec![AckRange::new(2, 5), AckRange::new(7, 8)]
        );
        // R에 없는 시드는 무시
        assert!(schedule(&received, &set(&[6]), 10).is_empty());
    }

    #[test]
    fn test_full_set_is_single_range() {
        let received: BTreeSet<u32> = (0..5).collect();
        assert_eq!(schedule(&received, &set(&[3]), 5), vec![AckRange::new(0, 4)]);
    }

    #[test]
    fn test_expand_ignores_stale_indices() {
        let ranges = vec![AckRange::new(3, 12), AckRange::new(20, 1)];
        assert_eq!(expand(&ranges, 5), set(&[0, 1, 3, 4]));
        assert!(expand(&ranges, 0).is_empty());
    }

    /// 작은 total에 대해 모든 R과 모든 Q ⊆ R 조합 검사
    #[test]
    fn test_exhaustive_cover_properties() {
        for total in 1..=7u32 {
            for r_mask in 0u32..(1 << total) {
                let received: BTreeSet<u32> = (0..total).filter(|i| r_mask & (1 << i) != 0).collect();
                let members: Vec<u32> = received.iter().copied().collect();

                for q_mask in 0u32..(1 << members.len()) {
                    let requested: BTreeSet<u32> = members
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| q_mask & (1 << j) != 0)
                        .map(|(_, i)| *i)
                        .collect();

                    let ranges = schedule(&received, &requested, total);
                    let covered = expand(&ranges, total);

                    assert!(covered.is_superset(&requested), "total={total} R={received:?} Q={requested:?}");
                    assert!(covered.is_subset(&received), "total={total} R={received:?} Q={requested:?}");

                    // 범위끼리 겹치지 않음
                    let counted: usize = ranges.iter().map(|r| r.indices(total).count()).sum();
                    assert_eq!(counted, covered.len());

                    // 인접한 두 범위가 남아있으면 안 됨 (최소 개수)
                    for a in &ranges {
                        for b in &ranges {
                            if a != b {
                                assert_ne!((a.end + 1) % total, b.start, "ranges={ranges:?}");
                            }
                        }
                    }
                }
            }
        }
    }
}
