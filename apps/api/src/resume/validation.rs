use std::collections::HashSet;

use crate::errors::AppError;
use crate::models::resume::ResumeData;

pub const MAX_EDUCATION: usize = 2;
pub const MAX_EXPERIENCE: usize = 3;
pub const MAX_PROJECTS: usize = 3;
pub const MAX_BULLETS_PER_ENTRY: usize = 50;
pub const MAX_FIELD_CHARS: usize = 2_000;

/// Checks the editor limits on a resume payload.
///
/// The database does not enforce any of these; they are applied here so a
/// client that bypasses the editor still gets a 400 instead of a resume the
/// preview cannot lay out.
pub fn validate_resume(data: &ResumeData) -> Result<(), AppError> {
    let problems = collect_problems(data);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(problems.join("; ")))
    }
}

fn collect_problems(data: &ResumeData) -> Vec<String> {
    let mut problems = Vec::new();

    check_count(&mut problems, "education", data.education.len(), MAX_EDUCATION);
    check_count(&mut problems, "experience", data.experience.len(), MAX_EXPERIENCE);
    check_count(&mut problems, "projects", data.projects.len(), MAX_PROJECTS);

    let mut seen = HashSet::new();
    for skill in &data.skills {
        if !seen.insert(skill.category) {
            problems.push(format!(
                "skills: category '{}' appears more than once",
                skill.category
            ));
        }
    }

    let personal = &data.personal;
    for (field, value) in [
        ("personal.name", &personal.name),
        ("personal.email", &personal.email),
        ("personal.phone", &personal.phone),
        ("personal.linkedin", &personal.linkedin),
        ("personal.github", &personal.github),
    ] {
        check_len(&mut problems, field, value.as_deref());
    }

    for (i, e) in data.education.iter().enumerate() {
        for (field, value) in [
            ("school", &e.school),
            ("degree", &e.degree),
            ("location", &e.location),
            ("start_date", &e.start_date),
            ("end_date", &e.end_date),
            ("gpa", &e.gpa),
        ] {
            check_len(&mut problems, &format!("education[{i}].{field}"), value.as_deref());
        }
    }

    for (i, e) in data.experience.iter().enumerate() {
        for (field, value) in [
            ("company", &e.company),
            ("role", &e.role),
            ("location", &e.location),
            ("start_date", &e.start_date),
            ("end_date", &e.end_date),
        ] {
            check_len(&mut problems, &format!("experience[{i}].{field}"), value.as_deref());
        }
        check_bullets(&mut problems, &format!("experience[{i}]"), &e.bullets);
    }

    for (i, p) in data.projects.iter().enumerate() {
        for (field, value) in [
            ("name", &p.name),
            ("tech_stack", &p.tech_stack),
            ("link", &p.link),
            ("start_date", &p.start_date),
            ("end_date", &p.end_date),
        ] {
            check_len(&mut problems, &format!("projects[{i}].{field}"), value.as_deref());
        }
        check_bullets(&mut problems, &format!("projects[{i}]"), &p.bullets);
    }

    for skill in &data.skills {
        check_bullets(&mut problems, &format!("skills.{}", skill.category), &skill.items);
    }

    problems
}

fn check_count(problems: &mut Vec<String>, section: &str, count: usize, max: usize) {
    if count > max {
        problems.push(format!("{section}: at most {max} entries allowed, got {count}"));
    }
}

fn check_len(problems: &mut Vec<String>, field: &str, value: Option<&str>) {
    if let Some(v) = value {
        let chars = v.chars().count();
        if chars > MAX_FIELD_CHARS {
            problems.push(format!(
                "{field}: longer than {MAX_FIELD_CHARS} characters ({chars})"
            ));
        }
        // Postgres TEXT cannot store NUL.
        if v.contains('\0') {
            problems.push(format!("{field}: contains a NUL character"));
        }
    }
}

fn check_bullets(problems: &mut Vec<String>, owner: &str, bullets: &[String]) {
    if bullets.len() > MAX_BULLETS_PER_ENTRY {
        problems.push(format!(
            "{owner}: at most {MAX_BULLETS_PER_ENTRY} items allowed, got {}",
            bullets.len()
        ));
    }
    for (i, bullet) in bullets.iter().enumerate() {
        check_len(problems, &format!("{owner}[{i}]"), Some(bullet));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::{Education, Experience, Project, Skill, SkillCategory};

    fn message(data: &ResumeData) -> String {
        match validate_resume(data) {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_resume_is_valid() {
        assert!(validate_resume(&ResumeData::default()).is_ok());
    }

    #[test]
    fn test_at_caps_is_valid() {
        let data = ResumeData {
            education: vec![Education::default(); MAX_EDUCATION],
            experience: vec![Experience::default(); MAX_EXPERIENCE],
            projects: vec![Project::default(); MAX_PROJECTS],
            skills: SkillCategory::ALL
                .into_iter()
                .map(|category| Skill {
                    category,
                    items: vec!["x".to_string()],
                })
                .collect(),
            ..Default::default()
        };
        assert!(validate_resume(&data).is_ok());
    }

    #[test]
    fn test_too_many_education_entries() {
        let data = ResumeData {
            education: vec![Education::default(); MAX_EDUCATION + 1],
            ..Default::default()
        };
        assert!(message(&data).contains("education: at most 2"));
    }

    #[test]
    fn test_too_many_experience_and_projects_reported_together() {
        let data = ResumeData {
            experience: vec![Experience::default(); 4],
            projects: vec![Project::default(); 5],
            ..Default::default()
        };
        let msg = message(&data);
        assert!(msg.contains("experience: at most 3 entries allowed, got 4"));
        assert!(msg.contains("projects: at most 3 entries allowed, got 5"));
    }

    #[test]
    fn test_duplicate_skill_category() {
        let skill = Skill {
            category: SkillCategory::Languages,
            items: vec!["Rust".to_string()],
        };
        let data = ResumeData {
            skills: vec![skill.clone(), skill],
            ..Default::default()
        };
        assert!(message(&data).contains("'languages' appears more than once"));
    }

    #[test]
    fn test_overlong_field() {
        let mut data = ResumeData::default();
        data.personal.name = Some("a".repeat(MAX_FIELD_CHARS + 1));
        assert!(message(&data).contains("personal.name"));
    }

    #[test]
    fn test_overlong_bullet_is_located() {
        let data = ResumeData {
            experience: vec![Experience {
                bullets: vec!["ok".to_string(), "b".repeat(MAX_FIELD_CHARS + 1)],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(message(&data).contains("experience[0][1]"));
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        let mut data = ResumeData::default();
        data.personal.name = Some("é".repeat(MAX_FIELD_CHARS));
        assert!(validate_resume(&data).is_ok());
    }

    #[test]
    fn test_nul_character_rejected() {
        let data = ResumeData {
            projects: vec![Project {
                bullets: vec!["fine".to_string(), "bad\u{0}byte".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(message(&data).contains("projects[0][1]: contains a NUL character"));

        let mut data = ResumeData::default();
        data.personal.email = Some("\0".to_string());
        assert!(message(&data).contains("personal.email"));
    }
}
