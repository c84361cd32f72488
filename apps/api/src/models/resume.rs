use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// API types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personal {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Education {
    pub school: Option<String>,
    pub degree: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    pub company: Option<String>,
    pub role: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub name: Option<String>,
    pub tech_stack: Option<String>,
    pub link: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub bullets: Vec<String>,
}

/// Closed set of skill groupings shown in the "Technical Skills" section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Languages,
    Frameworks,
    DeveloperTools,
    Libraries,
}

impl SkillCategory {
    pub const ALL: [SkillCategory; 4] = [
        SkillCategory::Languages,
        SkillCategory::Frameworks,
        SkillCategory::DeveloperTools,
        SkillCategory::Libraries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Languages => "languages",
            SkillCategory::Frameworks => "frameworks",
            SkillCategory::DeveloperTools => "developer_tools",
            SkillCategory::Libraries => "libraries",
        }
    }

    /// Heading used when rendering the category.
    pub fn label(&self) -> &'static str {
        match self {
            SkillCategory::Languages => "Languages",
            SkillCategory::Frameworks => "Frameworks",
            SkillCategory::DeveloperTools => "Developer Tools",
            SkillCategory::Libraries => "Libraries",
        }
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkillCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown skill category '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub category: SkillCategory,
    #[serde(default)]
    pub items: Vec<String>,
}

/// The editable content of a resume, exactly as the editor posts it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeData {
    pub personal: Personal,
    pub education: Vec<Education>,
    pub experience: Vec<Experience>,
    pub projects: Vec<Project>,
    pub skills: Vec<Skill>,
}

/// A stored resume: content plus identity and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: ResumeData,
}

// ────────────────────────────────────────────────────────────────────────────
// Database rows
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeRow {
    pub fn personal(&self) -> Personal {
        Personal {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            linkedin: self.linkedin.clone(),
            github: self.github.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EducationRow {
    pub school: Option<String>,
    pub degree: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub gpa: Option<String>,
}

impl From<EducationRow> for Education {
    fn from(row: EducationRow) -> Self {
        Education {
            school: row.school,
            degree: row.degree,
            location: row.location,
            start_date: row.start_date,
            end_date: row.end_date,
            gpa: row.gpa,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ExperienceRow {
    pub company: Option<String>,
    pub role: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub bullets: Vec<String>,
}

impl From<ExperienceRow> for Experience {
    fn from(row: ExperienceRow) -> Self {
        Experience {
            company: row.company,
            role: row.role,
            location: row.location,
            start_date: row.start_date,
            end_date: row.end_date,
            bullets: row.bullets,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub name: Option<String>,
    pub tech_stack: Option<String>,
    pub link: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub bullets: Vec<String>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            name: row.name,
            tech_stack: row.tech_stack,
            link: row.link,
            start_date: row.start_date,
            end_date: row.end_date,
            bullets: row.bullets,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SkillRow {
    pub category: String,
    pub items: Vec<String>,
}

impl TryFrom<SkillRow> for Skill {
    type Error = String;

    fn try_from(row: SkillRow) -> Result<Self, Self::Error> {
        Ok(Skill {
            category: row.category.parse()?,
            items: row.items,
        })
    }
}
