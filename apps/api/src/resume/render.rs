//! HTML rendering of a resume for the live preview and the printable export.
//!
//! The export is a complete document with print CSS; the browser's print
//! dialog turns it into the PDF. The preview is the same markup without the
//! document shell so the editor can inline it.

use crate::models::resume::{Education, Experience, Project, Resume, ResumeData, Skill};

const PRINT_CSS: &str = r#"
@page { size: letter; margin: 0.5in; }
body { font-family: "Times New Roman", serif; font-size: 11pt; color: #000; margin: 0; }
.resume header { text-align: center; margin-bottom: 6pt; }
.resume header h1 { font-size: 22pt; margin: 0; }
.resume .contact { font-size: 10pt; }
.resume section h2 { font-size: 12pt; text-transform: uppercase; border-bottom: 1px solid #000; margin: 8pt 0 4pt; }
.resume .entry-head { display: flex; justify-content: space-between; font-weight: bold; }
.resume .entry-sub { display: flex; justify-content: space-between; font-style: italic; }
.resume ul { margin: 2pt 0 4pt 14pt; padding: 0; }
@media print { .no-print { display: none !important; } }
"#;

/// Renders the resume as an HTML fragment rooted at `<div class="resume">`.
pub fn render_preview(data: &ResumeData) -> String {
    let mut html = String::from("<div class=\"resume\">\n");
    render_header(&mut html, data);
    render_education(&mut html, &data.education);
    render_experience(&mut html, &data.experience);
    render_projects(&mut html, &data.projects);
    render_skills(&mut html, &data.skills);
    html.push_str("</div>\n");
    html
}

/// Renders a standalone, print-ready HTML document.
pub fn render_document(resume: &Resume) -> String {
    let title = resume
        .data
        .personal
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("{} - Resume", escape(n)))
        .unwrap_or_else(|| "Resume".to_string());

    let mut html = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n"));
    html.push_str(&format!("<style>{PRINT_CSS}</style>\n"));
    html.push_str("</head>\n<body>\n");
    html.push_str(&render_preview(&resume.data));
    html.push_str("</body>\n</html>\n");
    html
}

fn render_header(html: &mut String, data: &ResumeData) {
    let p = &data.personal;
    let contact: Vec<String> = [&p.email, &p.phone, &p.linkedin, &p.github]
        .into_iter()
        .filter_map(|v| present(v))
        .map(escape)
        .collect();

    if present(&p.name).is_none() && contact.is_empty() {
        return;
    }

    html.push_str("<header>\n");
    if let Some(name) = present(&p.name) {
        html.push_str(&format!("<h1>{}</h1>\n", escape(name)));
    }
    if !contact.is_empty() {
        html.push_str(&format!(
            "<div class=\"contact\">{}</div>\n",
            contact.join(" | ")
        ));
    }
    html.push_str("</header>\n");
}

fn render_education(html: &mut String, entries: &[Education]) {
    if entries.is_empty() {
        return;
    }
    html.push_str("<section class=\"education\">\n<h2>Education</h2>\n");
    for e in entries {
        html.push_str("<div class=\"entry\">\n");
        entry_line(html, "entry-head", &e.school, &e.location);
        let degree = match (present(&e.degree), present(&e.gpa)) {
            (Some(d), Some(g)) => Some(format!("{d}, GPA: {g}")),
            (Some(d), None) => Some(d.to_string()),
            (None, Some(g)) => Some(format!("GPA: {g}")),
            (None, None) => None,
        };
        entry_line(html, "entry-sub", &degree, &date_range(&e.start_date, &e.end_date));
        html.push_str("</div>\n");
    }
    html.push_str("</section>\n");
}

fn render_experience(html: &mut String, entries: &[Experience]) {
    if entries.is_empty() {
        return;
    }
    html.push_str("<section class=\"experience\">\n<h2>Experience</h2>\n");
    for e in entries {
        html.push_str("<div class=\"entry\">\n");
        entry_line(html, "entry-head", &e.role, &date_range(&e.start_date, &e.end_date));
        entry_line(html, "entry-sub", &e.company, &e.location);
        render_bullets(html, &e.bullets);
        html.push_str("</div>\n");
    }
    html.push_str("</section>\n");
}

fn render_projects(html: &mut String, entries: &[Project]) {
    if entries.is_empty() {
        return;
    }
    html.push_str("<section class=\"projects\">\n<h2>Projects</h2>\n");
    for p in entries {
        html.push_str("<div class=\"entry\">\n<div class=\"entry-head\"><span>");
        if let Some(name) = present(&p.name) {
            match present(&p.link).and_then(safe_href) {
                Some(href) => html.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    escape(&href),
                    escape(name)
                )),
                None => html.push_str(&escape(name)),
            }
        }
        if let Some(stack) = present(&p.tech_stack) {
            html.push_str(&format!(" | <em>{}</em>", escape(stack)));
        }
        html.push_str("</span><span>");
        if let Some(range) = date_range(&p.start_date, &p.end_date) {
            html.push_str(&escape(&range));
        }
        html.push_str("</span></div>\n");
        render_bullets(html, &p.bullets);
        html.push_str("</div>\n");
    }
    html.push_str("</section>\n");
}

fn render_skills(html: &mut String, skills: &[Skill]) {
    let groups: Vec<&Skill> = skills
        .iter()
        .filter(|s| s.items.iter().any(|i| !i.trim().is_empty()))
        .collect();
    if groups.is_empty() {
        return;
    }
    html.push_str("<section class=\"skills\">\n<h2>Technical Skills</h2>\n<ul>\n");
    for skill in groups {
        let items: Vec<String> = skill
            .items
            .iter()
            .map(|i| i.trim())
            .filter(|i| !i.is_empty())
            .map(escape)
            .collect();
        html.push_str(&format!(
            "<li><strong>{}</strong>: {}</li>\n",
            skill.category.label(),
            items.join(", ")
        ));
    }
    html.push_str("</ul>\n</section>\n");
}

fn render_bullets(html: &mut String, bullets: &[String]) {
    let bullets: Vec<&str> = bullets
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .collect();
    if bullets.is_empty() {
        return;
    }
    html.push_str("<ul>\n");
    for b in bullets {
        html.push_str(&format!("<li>{}</li>\n", escape(b)));
    }
    html.push_str("</ul>\n");
}

fn entry_line(html: &mut String, class: &str, left: &Option<String>, right: &Option<String>) {
    if present(left).is_none() && present(right).is_none() {
        return;
    }
    html.push_str(&format!(
        "<div class=\"{class}\"><span>{}</span><span>{}</span></div>\n",
        present(left).map(escape).unwrap_or_default(),
        present(right).map(escape).unwrap_or_default()
    ));
}

fn date_range(start: &Option<String>, end: &Option<String>) -> Option<String> {
    match (present(start), present(end)) {
        (Some(s), Some(e)) => Some(format!("{s} - {e}")),
        (Some(s), None) => Some(format!("{s} - Present")),
        (None, Some(e)) => Some(e.to_string()),
        (None, None) => None,
    }
}

/// Link schemes a project link may use.
const LINK_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Turns a user-entered project link into an `href`, or `None` when it
/// should render as plain text. Bare hosts such as `example.com` get an
/// `https://` prefix.
fn safe_href(link: &str) -> Option<String> {
    if link.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }
    if link.starts_with("//") {
        return Some(format!("https:{link}"));
    }
    match link.split_once(':') {
        Some((scheme, _)) if is_scheme(scheme) => LINK_SCHEMES
            .iter()
            .any(|allowed| scheme.eq_ignore_ascii_case(allowed))
            .then(|| link.to_string()),
        _ if link.starts_with('/') => None,
        _ => Some(format!("https://{link}")),
    }
}

fn is_scheme(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Non-blank field value.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
