//! Static Tag -> (VR, keyword) dictionary.
//!
//! Loaded once per process from the embedded tab-separated table. Entries
//! whose tag contains `x` digits (repeating groups such as the overlay
//! planes) go into a partial-match list compiled to regexes; everything
//! else into the full-match map.

use std::collections::HashMap;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::{Tag, Vr};

const DICTIONARY_SOURCE: &str = include_str!("../data/tag_dictionary.tsv");

#[derive(Debug, Clone)]
pub struct DictEntry {
    pub vr: Vr,
    pub keyword: &'static str,
}

pub struct TagDictionary {
    full_match: HashMap<String, DictEntry>,
    partial_match: Vec<(Regex, DictEntry)>,
    by_keyword: HashMap<&'static str, Tag>,
}

impl TagDictionary {
    fn load() -> Self {
        let mut full_match = HashMap::new();
        let mut partial_match = Vec::new();
        let mut by_keyword = HashMap::new();

        for line in DICTIONARY_SOURCE.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut columns = line.split('\t');
            let (Some(tag), Some(vr), Some(keyword)) =
                (columns.next(), columns.next(), columns.next())
            else {
                continue;
            };
            let Some(vr) = Vr::from_str_opt(vr) else {
                continue;
            };
            let entry = DictEntry { vr, keyword };

            if tag.contains('x') {
                // Wildcard digits match any hex digit, e.g. "60xx,3000".
                let pattern = format!("^{}$", tag.replace('x', "[0-9A-F]"));
                if let Ok(regex) = Regex::new(&pattern) {
                    partial_match.push((regex, entry));
                }
            } else {
                if let Ok(parsed) = Tag::from_str(tag) {
                    by_keyword.insert(keyword, parsed);
                }
                full_match.insert(tag.to_string(), entry);
            }
        }

        TagDictionary {
            full_match,
            partial_match,
            by_keyword,
        }
    }

    pub fn entry_of(&self, tag: Tag) -> Option<&DictEntry> {
        let key = tag.dict_key();
        if let Some(entry) = self.full_match.get(&key) {
            return Some(entry);
        }
        self.partial_match
            .iter()
            .find(|(regex, _)| regex.is_match(&key))
            .map(|(_, entry)| entry)
    }

    /// VR declared by the standard for this tag. Unknown (private) tags
    /// fall back to UN.
    pub fn vr_of(&self, tag: Tag) -> Vr {
        self.entry_of(tag).map(|e| e.vr).unwrap_or(Vr::UN)
    }

    pub fn keyword_of(&self, tag: Tag) -> Option<&'static str> {
        self.entry_of(tag).map(|e| e.keyword)
    }

    /// Reverse lookup used by drop-lists that name fields by keyword.
    pub fn tag_by_keyword(&self, keyword: &str) -> Option<Tag> {
        self.by_keyword.get(keyword).copied()
    }
}

lazy_static! {
    pub static ref TAG_DICTIONARY: TagDictionary = TagDictionary::load();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tags;

    #[test]
    fn full_match_lookup() {
        assert_eq!(TAG_DICTIONARY.vr_of(tags::SOP_INSTANCE_UID), Vr::UI);
        assert_eq!(TAG_DICTIONARY.vr_of(tags::ROWS), Vr::US);
        assert_eq!(TAG_DICTIONARY.vr_of(tags::PIXEL_DATA), Vr::OW);
        assert_eq!(
            TAG_DICTIONARY.keyword_of(Tag::new(0x0010, 0x0010)),
            Some("PatientName")
        );
    }

    #[test]
    fn partial_match_covers_repeating_groups() {
        // Overlay planes live at even groups 6000-601E.
        assert_eq!(TAG_DICTIONARY.vr_of(Tag::new(0x6000, 0x3000)), Vr::OW);
        assert_eq!(TAG_DICTIONARY.vr_of(Tag::new(0x6002, 0x0010)), Vr::US);
        assert_eq!(
            TAG_DICTIONARY.keyword_of(Tag::new(0x6000, 0x0040)),
            Some("OverlayType")
        );
    }

    #[test]
    fn unknown_tags_fall_back_to_un() {
        assert_eq!(TAG_DICTIONARY.vr_of(Tag::new(0x0009, 0x0001)), Vr::UN);
        assert_eq!(TAG_DICTIONARY.keyword_of(Tag::new(0x0009, 0x0001)), None);
    }

    #[test]
    fn keyword_reverse_lookup() {
        assert_eq!(
            TAG_DICTIONARY.tag_by_keyword("PatientName"),
            Some(Tag::new(0x0010, 0x0010))
        );
        assert_eq!(TAG_DICTIONARY.tag_by_keyword("NotARealKeyword"), None);
    }
}
