//! Tolerant, first-match-wins tag extraction.
//!
//! Nostr tags are arrays of strings; the first element is the key. Per the
//! classifier's design, a missing or malformed tag is never an error — it is
//! absent, and callers decide whether that means "drop the event".

/// Returns the second element of the first tag whose first element equals
/// `key`, scanning `tags` in order.
pub fn first_tag_value<'a, T>(tags: &'a [T], key: &str) -> Option<&'a str>
where
    T: AsRef<[String]>,
{
    tags.iter().find_map(|tag| {
        let tag = tag.as_ref();
        if tag.len() >= 2 && tag[0] == key {
            Some(tag[1].as_str())
        } else {
            None
        }
    })
}
