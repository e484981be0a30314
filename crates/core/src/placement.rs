use std::cmp::Reverse;

use tracing::debug;

use crate::disk::SpaceProbe;
use crate::model::{ConsolidationDecision, Disk, Item};

/// Chooses where a fragmented item should be merged.
///
/// Fragment-hosting disks are tried first, heaviest fragment first, so the
/// fewest bytes move. Each candidate must keep more than `safety_buffer`
/// bytes free after receiving what it does not already hold. When none
/// qualifies, the disks hosting nothing of the item are tried by descending
/// free space; for those every byte has to move, so all of them cost the same.
pub fn select_target(
    item: &Item,
    disks: &[Disk],
    probe: &dyn SpaceProbe,
    safety_buffer: u64,
) -> ConsolidationDecision {
    if !item.is_fragmented() {
        return ConsolidationDecision::Unchanged {
            resident: item.fragments.first().map(|fragment| fragment.disk.clone()),
        };
    }

    let total = item.total_size();

    let mut hosts = item.fragments.iter().collect::<Vec<_>>();
    hosts.sort_by_key(|fragment| (Reverse(fragment.stats.size_bytes), fragment.disk.index));
    for fragment in hosts {
        let needed = total.saturating_sub(fragment.stats.size_bytes);
        let free = probe.free_space(&fragment.disk);
        debug!(
            "candidate {} for {}: free {} needed {} buffer {}",
            fragment.disk.id, item.name, free, needed, safety_buffer
        );
        if free > needed.saturating_add(safety_buffer) {
            return ConsolidationDecision::Consolidate {
                target: fragment.disk.clone(),
                bytes_to_move: needed,
            };
        }
    }

    let mut others = disks
        .iter()
        .filter(|disk| item.fragment_on(disk).is_none())
        .map(|disk| (probe.free_space(disk), disk))
        .collect::<Vec<_>>();
    others.sort_by_key(|(free, disk)| (Reverse(*free), disk.index));
    for (free, disk) in others {
        if free > total.saturating_add(safety_buffer) {
            return ConsolidationDecision::Consolidate {
                target: disk.clone(),
                bytes_to_move: total,
            };
        }
    }

    ConsolidationDecision::FailedNoSpace {
        required_bytes: total.saturating_add(safety_buffer),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::select_target;
    use crate::disk::FixedSpaceProbe;
    use crate::model::{
        Category, ConsolidationDecision, ContentKind, Disk, Fragment, FragmentStats, Item,
    };

    const GB: u64 = 1_000_000_000;
    const BUFFER: u64 = 10 * GB;

    fn disk(index: u32) -> Disk {
        Disk {
            id: format!("disk{index}"),
            index,
            mount: PathBuf::from(format!("/mnt/disk{index}")),
        }
    }

    fn item(parts: &[(u32, u64)]) -> Item {
        Item {
            category: Category {
                name: "Peliculas HD".to_string(),
                relative_path: PathBuf::from("peliculas/Peliculas HD"),
                kind: ContentKind::Movies,
            },
            name: "Heat (1995)".to_string(),
            fragments: parts
                .iter()
                .map(|(index, size_bytes)| Fragment {
                    disk: disk(*index),
                    path: PathBuf::from(format!("/mnt/disk{index}/peliculas/Peliculas HD/Heat")),
                    stats: FragmentStats {
                        size_bytes: *size_bytes,
                        ..FragmentStats::default()
                    },
                })
                .collect(),
        }
    }

    fn disks(count: u32) -> Vec<Disk> {
        (1..=count).map(disk).collect()
    }

    #[test]
    fn whole_item_is_unchanged_and_keeps_resident_disk() {
        let decision = select_target(
            &item(&[(3, 50 * GB)]),
            &disks(3),
            &FixedSpaceProbe::default(),
            BUFFER,
        );
        assert_eq!(
            decision,
            ConsolidationDecision::Unchanged {
                resident: Some(disk(3))
            }
        );
    }

    #[test]
    fn heaviest_fragment_host_wins_when_it_has_room() {
        let probe = FixedSpaceProbe::new([("disk1", 111 * GB), ("disk2", 5_000 * GB)]);
        let decision = select_target(&item(&[(2, 100 * GB), (1, 300 * GB)]), &disks(2), &probe, BUFFER);
        assert_eq!(
            decision,
            ConsolidationDecision::Consolidate {
                target: disk(1),
                bytes_to_move: 100 * GB,
            }
        );
    }

    #[test]
    fn buffer_is_a_strict_lower_bound() {
        let probe = FixedSpaceProbe::new([("disk1", 110 * GB), ("disk2", 310 * GB)]);
        let decision = select_target(&item(&[(1, 300 * GB), (2, 100 * GB)]), &disks(2), &probe, BUFFER);
        assert_eq!(decision, ConsolidationDecision::FailedNoSpace { required_bytes: 410 * GB });
    }

    #[test]
    fn lighter_host_is_used_before_foreign_disks() {
        let probe = FixedSpaceProbe::new([
            ("disk1", 50 * GB),
            ("disk2", 400 * GB),
            ("disk3", 9_000 * GB),
        ]);
        let decision = select_target(&item(&[(1, 300 * GB), (2, 100 * GB)]), &disks(3), &probe, BUFFER);
        assert_eq!(
            decision,
            ConsolidationDecision::Consolidate {
                target: disk(2),
                bytes_to_move: 300 * GB,
            }
        );
    }

    #[test]
    fn falls_back_to_emptiest_foreign_disk() {
        let probe = FixedSpaceProbe::new([
            ("disk1", 5 * GB),
            ("disk2", 5 * GB),
            ("disk3", 600 * GB),
            ("disk4", 800 * GB),
        ]);
        let decision = select_target(&item(&[(1, 300 * GB), (2, 100 * GB)]), &disks(4), &probe, BUFFER);
        assert_eq!(
            decision,
            ConsolidationDecision::Consolidate {
                target: disk(4),
                bytes_to_move: 400 * GB,
            }
        );
    }

    #[test]
    fn refuses_when_no_disk_has_room() {
        let probe = FixedSpaceProbe::new([
            ("disk1", 200 * GB),
            ("disk2", 255 * GB),
            ("disk3", 510 * GB),
        ]);
        let decision = select_target(&item(&[(1, 250 * GB), (2, 250 * GB)]), &disks(3), &probe, BUFFER);
        assert!(matches!(decision, ConsolidationDecision::FailedNoSpace { .. }));
    }
}
