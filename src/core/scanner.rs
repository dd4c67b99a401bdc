// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Parser for the partition dumper's output.
//!
//! The dump is line oriented: a `DISK <table>` record announces the table
//! mode, each `PART <index> <type...>` record describes one slot. The
//! parser is permissive; filesystem probing downstream is authoritative.

pub const GPT_BASIC_DATA: &str = "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7";

/// MBR types we expect to carry a mountable FAT/NTFS/exFAT filesystem.
const MBR_KNOWN_TYPES: &[u8] = &[0x06, 0x07, 0x0b, 0x0c, 0x0e];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Unknown,
    Mbr,
    Gpt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    Mbr(u8),
    Gpt { type_guid: String },
    /// PART record seen before any DISK record; carries no type info.
    Bare,
}

#[derive(Debug, Clone)]
pub struct PartRecord {
    pub index: u32,
    pub kind: PartKind,
}

impl PartRecord {
    pub fn is_known_mbr_type(&self) -> bool {
        matches!(self.kind, PartKind::Mbr(t) if MBR_KNOWN_TYPES.contains(&t))
    }

    pub fn is_gpt_basic_data(&self) -> bool {
        matches!(&self.kind, PartKind::Gpt { type_guid } if type_guid.eq_ignore_ascii_case(GPT_BASIC_DATA))
    }
}

#[derive(Debug, Clone)]
pub struct DiskDump {
    pub table: Table,
    /// True when any PART record appeared, in range or not.
    pub found_parts: bool,
    pub parts: Vec<PartRecord>,
}

/// Parses dumper stdout. Indices outside `1..=max_minors` are skipped with
/// a warning; the record still counts towards `found_parts`.
pub fn parse_dump(disk_id: &str, lines: &[String], max_minors: u32) -> DiskDump {
    let mut table = Table::Unknown;
    let mut found_parts = false;
    let mut parts = Vec::new();

    for line in lines {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };

        match first {
            "DISK" => {
                table = match tokens.next() {
                    Some("mbr") => Table::Mbr,
                    Some("gpt") => Table::Gpt,
                    _ => Table::Unknown,
                };
            }
            "PART" => {
                found_parts = true;
                let index: i64 = tokens
                    .next()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
                if index <= 0 || index > max_minors as i64 {
                    log::warn!(
                        "{} is ignoring partition {} beyond max supported devices",
                        disk_id,
                        index
                    );
                    continue;
                }

                let kind = match table {
                    Table::Mbr => {
                        let raw = tokens.next().unwrap_or("0");
                        let raw = raw.strip_prefix("0x").unwrap_or(raw);
                        PartKind::Mbr(u8::from_str_radix(raw, 16).unwrap_or(0))
                    }
                    Table::Gpt => PartKind::Gpt {
                        type_guid: tokens.next().unwrap_or("").to_owned(),
                    },
                    Table::Unknown => PartKind::Bare,
                };

                parts.push(PartRecord {
                    index: index as u32,
                    kind,
                });
            }
            _ => {}
        }
    }

    DiskDump {
        table,
        found_parts,
        parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mbr_single_fat32() {
        let dump = parse_dump("disk:8,16", &lines(&["DISK mbr", "PART 1 c"]), 31);
        assert_eq!(dump.table, Table::Mbr);
        assert!(dump.found_parts);
        assert_eq!(dump.parts.len(), 1);
        assert_eq!(dump.parts[0].index, 1);
        assert_eq!(dump.parts[0].kind, PartKind::Mbr(0x0c));
        assert!(dump.parts[0].is_known_mbr_type());
    }

    #[test]
    fn mbr_unknown_type_is_kept() {
        let dump = parse_dump("disk:8,16", &lines(&["DISK mbr", "PART 1 83"]), 31);
        assert_eq!(dump.parts[0].kind, PartKind::Mbr(0x83));
        assert!(!dump.parts[0].is_known_mbr_type());
    }

    #[test]
    fn gpt_filters_nothing_at_parse_level() {
        let dump = parse_dump(
            "disk:8,0",
            &lines(&[
                "DISK gpt",
                "PART 1 EBD0A0A2-B9E5-4433-87C0-68B6B72699C7 0FC63DAF-0000-0000-0000-000000000001",
                "PART 2 19A710A2-B3CA-11E4-B026-10604B889DCF 0FC63DAF-0000-0000-0000-000000000002",
            ]),
            31,
        );
        assert_eq!(dump.parts.len(), 2);
        assert!(dump.parts[0].is_gpt_basic_data());
        assert!(!dump.parts[1].is_gpt_basic_data());
    }

    #[test]
    fn basic_data_guid_compares_case_insensitively() {
        let dump = parse_dump(
            "disk:8,0",
            &lines(&["DISK gpt", "PART 1 ebd0a0a2-b9e5-4433-87c0-68b6b72699c7 x"]),
            31,
        );
        assert!(dump.parts[0].is_gpt_basic_data());
    }

    #[test]
    fn out_of_range_index_skipped_but_found() {
        let dump = parse_dump("disk:179,0", &lines(&["DISK mbr", "PART 40 c"]), 31);
        assert!(dump.found_parts);
        assert!(dump.parts.is_empty());
    }

    #[test]
    fn no_table_line_leaves_unknown() {
        let dump = parse_dump("disk:8,16", &lines(&["PART 1 c"]), 31);
        assert_eq!(dump.table, Table::Unknown);
        assert!(dump.found_parts);
        assert_eq!(dump.parts[0].kind, PartKind::Bare);
    }

    #[test]
    fn empty_dump() {
        let dump = parse_dump("disk:8,16", &[], 31);
        assert_eq!(dump.table, Table::Unknown);
        assert!(!dump.found_parts);
        assert!(dump.parts.is_empty());
    }
}
