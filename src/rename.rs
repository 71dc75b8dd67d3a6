//! Naming rules for filing a document under a student.
//!
//! A proposed name is `<nendo>_<class code>_<student name>[_<tag>...]`
//! followed by the extension of the original file, e.g.
//! `2024_2B07_山田花子_面談.pdf`.

use crate::models::{split_extension, Student};

/// Characters Drive accepts but that break downloads on common desktops.
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn clean(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '-' } else { c })
        .collect()
}

/// Ordered name segments for a student document.
pub fn rename_segments(student: &Student, nendo: i32, tags: &[String]) -> Vec<String> {
    let mut segments = vec![
        nendo.to_string(),
        student.class_code(),
        clean(&student.full_name()),
    ];
    segments.extend(tags.iter().map(|t| clean(t)).filter(|t| !t.is_empty()));
    segments
}

/// Join `segments` and keep the extension of `former_name`.
pub fn proposed_name(segments: &[String], former_name: &str) -> String {
    let stem = segments
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("_");
    match split_extension(former_name).1 {
        Some(ext) => format!("{}{}", stem, ext),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Hr;

    fn hanako() -> Student {
        Student {
            gakunen: 2,
            hr: Hr::B,
            hr_no: 7,
            family_name: "山田".to_string(),
            given_name: "花子".to_string(),
            email: Some("hanako@example.com".to_string()),
        }
    }

    #[test]
    fn test_segments_and_name() {
        let segments = rename_segments(&hanako(), 2024, &["面談".to_string()]);
        assert_eq!(segments, vec!["2024", "2B07", "山田花子", "面談"]);
        assert_eq!(proposed_name(&segments, "scan001.PDF"), "2024_2B07_山田花子_面談.PDF");
    }

    #[test]
    fn test_tags_cleaned() {
        let segments = rename_segments(&hanako(), 2024, &[" a/b ".to_string(), "  ".to_string()]);
        assert_eq!(segments.last().map(String::as_str), Some("a-b"));
        assert_eq!(segments.len(), 4);
    }

    #[test]
    fn test_no_extension() {
        assert_eq!(proposed_name(&["x".to_string(), "y".to_string()], "README"), "x_y");
    }
}
