use chrono::Utc;
use serde_json::json;

use super::audit::{AuditEventType, AuditLog};
use super::domain::{
    ApplicationId, ApplicationPackage, BulletEntry, CandidateProfile, JobPosting, ResumeSection,
};
use super::grounding::{self, FactBase};

/// How many bullets a tailored section keeps, most relevant first.
const BULLETS_PER_SECTION: usize = 4;

/// Technology terms worth lifting out of a free-text job description when
/// the posting does not list them as explicit skill requirements.
const TECH_TERMS: &[&str] = &[
    "Python", "Rust", "Go", "Java", "TypeScript", "React", "Node.js", "AWS", "GCP", "Docker",
    "Kubernetes", "PostgreSQL", "Redis", "Kafka", "Terraform",
];

/// Everything one assembly needs, built fresh per job and never shared
/// across iterations. Cross-job contamination (wrong company, wrong role)
/// is a correctness bug, so nothing here outlives the job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: JobPosting,
    pub profile: CandidateProfile,
    pub bullets: Vec<BulletEntry>,
    pub keywords: Vec<String>,
    pub facts: FactBase,
}

impl JobContext {
    pub fn build(job: JobPosting, profile: CandidateProfile, bullets: Vec<BulletEntry>) -> Self {
        let mut keywords: Vec<String> = job
            .skills_required
            .iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect();

        let description = job.description.to_lowercase();
        for term in TECH_TERMS {
            if description.contains(&term.to_lowercase())
                && !keywords.iter().any(|kw| kw.eq_ignore_ascii_case(term))
            {
                keywords.push((*term).to_string());
            }
        }

        let facts = FactBase::from_profile(&profile, &bullets).with_posting(&job);

        Self {
            job,
            profile,
            bullets,
            keywords,
            facts,
        }
    }
}

/// One generated unit plus the source text it reverts to on a grounding
/// rejection.
#[derive(Debug, Clone)]
pub struct DraftUnit {
    pub source: String,
    pub generated: String,
}

#[derive(Debug, Clone)]
pub struct DraftSection {
    pub company: String,
    pub title: String,
    pub units: Vec<DraftUnit>,
}

/// Assembled-but-unverified package. [`PackageAssembler::finalize`] turns
/// this into an [`ApplicationPackage`] by verifying every unit.
#[derive(Debug, Clone)]
pub struct DraftPackage {
    pub sections: Vec<DraftSection>,
    pub cover_letter: DraftUnit,
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("candidate profile is missing")]
    MissingProfile,
    #[error("profile has no experience entries and the bullet bank is empty")]
    NoUsableContent,
}

/// Builds tailored application packages. Stateless; all inputs arrive via
/// the per-job [`JobContext`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageAssembler;

impl PackageAssembler {
    /// Select and reword resume content and draft the cover letter.
    /// Records the profile snapshot and each generation in the audit log.
    pub fn draft(
        &self,
        ctx: &JobContext,
        audit: &dyn AuditLog,
        application_id: &ApplicationId,
    ) -> Result<DraftPackage, AssemblyError> {
        audit.record(
            application_id,
            AuditEventType::Snapshot,
            "profile snapshot",
            json!({
                "name": ctx.profile.name,
                "email": ctx.profile.email,
                "skills": ctx.profile.skills.len(),
                "experience_entries": ctx.profile.experience.len(),
                "bullet_bank_entries": ctx.bullets.len(),
            }),
        );

        let mut sections = Vec::new();
        for experience in &ctx.profile.experience {
            let selected = self.select_bullets(ctx, &experience.company, &experience.bullets);
            if selected.is_empty() {
                continue;
            }
            let units = selected
                .into_iter()
                .map(|text| DraftUnit {
                    generated: reword_bullet(&text, &ctx.keywords),
                    source: text,
                })
                .collect();
            sections.push(DraftSection {
                company: experience.company.clone(),
                title: experience.title.clone(),
                units,
            });
        }

        if sections.is_empty() {
            return Err(AssemblyError::NoUsableContent);
        }

        audit.record(
            application_id,
            AuditEventType::Generation,
            "resume tailored",
            json!({
                "sections": sections.len(),
                "bullets": sections.iter().map(|s| s.units.len()).sum::<usize>(),
                "keywords": ctx.keywords,
            }),
        );

        let cover_letter = DraftUnit {
            source: generic_cover_letter(ctx),
            generated: tailored_cover_letter(ctx, &sections),
        };
        audit.record(
            application_id,
            AuditEventType::Generation,
            "cover letter generated",
            json!({ "characters": cover_letter.generated.len() }),
        );

        Ok(DraftPackage {
            sections,
            cover_letter,
        })
    }

    /// Verify every generated unit against the fact base; rejected units
    /// revert to their source text. This is a content-level revert, never
    /// an application-level failure.
    pub fn finalize(
        &self,
        ctx: &JobContext,
        draft: DraftPackage,
        audit: &dyn AuditLog,
        application_id: &ApplicationId,
    ) -> ApplicationPackage {
        let mut sections = Vec::new();
        for draft_section in draft.sections {
            let mut bullets = Vec::new();
            for unit in draft_section.units {
                bullets.push(self.verified_or_source(ctx, unit, "resume bullet", audit, application_id));
            }
            sections.push(ResumeSection {
                company: draft_section.company,
                title: draft_section.title,
                bullets,
            });
        }

        let report = grounding::verify(&draft.cover_letter.generated, &ctx.facts);
        audit.record(
            application_id,
            AuditEventType::Verification,
            "cover letter",
            json!({ "score": report.score, "flagged_claims": report.flagged_claims }),
        );
        let cover_letter = if report.accepted() {
            draft.cover_letter.generated
        } else {
            // Fall back to the generic template rather than aborting the
            // whole application.
            audit.record(
                application_id,
                AuditEventType::Generation,
                "cover letter fallback",
                json!({ "reason": "grounding rejection" }),
            );
            draft.cover_letter.source
        };

        ApplicationPackage {
            application_id: application_id.clone(),
            job_id: ctx.job.id.clone(),
            applicant_name: ctx.profile.name.clone(),
            applicant_email: ctx.profile.email.clone(),
            sections,
            cover_letter,
            assembled_at: Utc::now(),
        }
    }

    fn verified_or_source(
        &self,
        ctx: &JobContext,
        unit: DraftUnit,
        step: &str,
        audit: &dyn AuditLog,
        application_id: &ApplicationId,
    ) -> String {
        let report = grounding::verify(&unit.generated, &ctx.facts);
        audit.record(
            application_id,
            AuditEventType::Verification,
            step,
            json!({ "score": report.score, "flagged_claims": report.flagged_claims }),
        );
        if report.accepted() {
            unit.generated
        } else {
            unit.source
        }
    }

    /// Bank bullets for this employer ranked by keyword relevance, falling
    /// back to the profile's own bullets when the bank has none.
    fn select_bullets(
        &self,
        ctx: &JobContext,
        company: &str,
        profile_bullets: &[String],
    ) -> Vec<String> {
        let company_lower = company.to_lowercase();
        let mut scored: Vec<(usize, &BulletEntry)> = ctx
            .bullets
            .iter()
            .filter(|entry| entry.source_company.to_lowercase().contains(&company_lower))
            .map(|entry| (keyword_hits(&entry.text, &ctx.keywords), entry))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let selected: Vec<String> = scored
            .into_iter()
            .take(BULLETS_PER_SECTION)
            .map(|(_, entry)| entry.text.clone())
            .collect();
        if !selected.is_empty() {
            return selected;
        }

        profile_bullets
            .iter()
            .take(BULLETS_PER_SECTION)
            .cloned()
            .collect()
    }
}

fn keyword_hits(text: &str, keywords: &[String]) -> usize {
    let text_lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| text_lower.contains(&kw.to_lowercase()))
        .count()
}

/// Light rewording: align keyword casing with the posting so matched terms
/// read exactly as the employer writes them. Nothing is invented; a bullet
/// without matches passes through unchanged.
fn reword_bullet(text: &str, keywords: &[String]) -> String {
    let mut reworded = text.to_string();
    for keyword in keywords {
        // Byte offsets below assume lowercasing preserves them.
        if !reworded.is_ascii() || !keyword.is_ascii() {
            continue;
        }
        let lower = keyword.to_lowercase();
        let haystack = reworded.to_lowercase();
        if let Some(position) = haystack.find(&lower) {
            if reworded[position..position + keyword.len()] != *keyword {
                reworded.replace_range(position..position + keyword.len(), keyword);
            }
        }
    }
    reworded
}

fn tailored_cover_letter(ctx: &JobContext, sections: &[DraftSection]) -> String {
    let matched_skills: Vec<&String> = ctx
        .profile
        .skills
        .iter()
        .filter(|skill| {
            ctx.keywords
                .iter()
                .any(|kw| kw.eq_ignore_ascii_case(skill))
        })
        .take(3)
        .collect();

    let mut paragraphs = Vec::new();
    paragraphs.push(format!(
        "Dear {} team,\n\nI am writing to apply for the {} position. \
         The role is a strong match for my background.",
        ctx.job.company, ctx.job.title
    ));

    let mut body = String::new();
    if !matched_skills.is_empty() {
        let skills: Vec<String> = matched_skills.iter().map(|s| s.to_string()).collect();
        body.push_str(&format!(
            "My experience with {} maps directly onto your requirements.",
            skills.join(", ")
        ));
    }
    if let Some(first_unit) = sections.first().and_then(|s| s.units.first()) {
        if !body.is_empty() {
            body.push(' ');
        }
        body.push_str(&format!("Most recently: {}", first_unit.source));
    }
    if body.is_empty() {
        body.push_str("I would welcome the chance to put my experience to work for you.");
    }
    paragraphs.push(body);

    paragraphs.push(format!(
        "I would welcome the opportunity to discuss the role further.\n\nBest regards,\n{}",
        ctx.profile.name
    ));

    paragraphs.join("\n\n")
}

/// Claim-free fallback letter used when the tailored letter fails
/// grounding. References only the company and role, which are grounded in
/// the posting itself.
fn generic_cover_letter(ctx: &JobContext) -> String {
    format!(
        "Dear {} team,\n\nI am writing to apply for the {} position. \
         My background is a close fit for the role, and I would welcome the \
         opportunity to discuss it further.\n\nBest regards,\n{}",
        ctx.job.company, ctx.job.title, ctx.profile.name
    )
}
