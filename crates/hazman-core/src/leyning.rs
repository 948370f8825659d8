//! Hebrew book names for reading ranges (`Genesis 1:1` → `Bereshit 1:1`).

use std::sync::OnceLock;

use regex::{Captures, Regex};

const BOOKS: &[(&str, &str)] = &[
    ("Genesis", "Bereshit"),
    ("Exodus", "Shemot"),
    ("Leviticus", "Vayikra"),
    ("Numbers", "Bamidbar"),
    ("Deuteronomy", "Devarim"),
    ("Joshua", "Yehoshua"),
    ("Judges", "Shoftim"),
    ("I Samuel", "I Shmuel"),
    ("II Samuel", "II Shmuel"),
    ("1 Samuel", "I Shmuel"),
    ("2 Samuel", "II Shmuel"),
    ("I Kings", "I Melachim"),
    ("II Kings", "II Melachim"),
    ("1 Kings", "I Melachim"),
    ("2 Kings", "II Melachim"),
    ("Isaiah", "Yeshayahu"),
    ("Jeremiah", "Yirmiyahu"),
    ("Ezekiel", "Yechezkel"),
    ("Hosea", "Hoshea"),
    ("Joel", "Yoel"),
    ("Obadiah", "Ovadyah"),
    ("Jonah", "Yonah"),
    ("Micah", "Michah"),
    ("Nahum", "Nachum"),
    ("Habakkuk", "Chavakuk"),
    ("Zephaniah", "Tzefaniah"),
    ("Haggai", "Chaggai"),
    ("Psalms", "Tehillim"),
    ("Proverbs", "Mishlei"),
    ("Job", "Iyov"),
    ("Song of Songs", "Shir HaShirim"),
    ("Ruth", "Rut"),
    ("Lamentations", "Eicha"),
    ("Ecclesiastes", "Kohelet"),
    ("Esther", "Ester"),
    ("Nehemiah", "Nechemyah"),
    ("I Chronicles", "I Divrei HaYamim"),
    ("II Chronicles", "II Divrei HaYamim"),
    ("1 Chronicles", "I Divrei HaYamim"),
    ("2 Chronicles", "II Divrei HaYamim"),
];

fn book_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut names: Vec<&str> = BOOKS.iter().map(|(english, _)| *english).collect();
        // Longest first so "II Samuel" is not consumed as "I Samuel".
        names.sort_by_key(|name| std::cmp::Reverse(name.len()));
        let alternation = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b(?:{alternation})\b")).expect("book pattern is valid")
    })
}

/// Replaces whole-word English book names with their Hebrew names.
pub fn transliterate_books(text: &str) -> String {
    book_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let matched = &caps[0];
            BOOKS
                .iter()
                .find(|(english, _)| *english == matched)
                .map(|(_, hebrew)| (*hebrew).to_string())
                .unwrap_or_else(|| matched.to_string())
        })
        .into_owned()
}
