use worldsmith_types::{InterpretedBrief, RequestDescriptor, Result, StageName};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

/// Subject keywords, checked in order against the lowercased topic.
const SUBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Biologie",
        &[
            "photosynth", "zelle", "pflanze", "blatt", "ökosystem", "evolution", "genetik",
            "verdauung", "blutkreislauf", "herz", "bakterie", "insekt", "photosynthesis", "cell",
        ],
    ),
    (
        "Chemie",
        &["atom", "molekül", "reaktion", "säure", "periodensystem", "oxidation", "chemical"],
    ),
    (
        "Physik",
        &["kraft", "energie", "strom", "magnet", "optik", "schwerkraft", "schall", "gravity"],
    ),
    (
        "Mathematik",
        &["bruch", "gleichung", "geometrie", "prozent", "dreieck", "algebra", "fraction"],
    ),
    (
        "Geografie",
        &["kontinent", "vulkan", "klima", "erdbeben", "gebirge", "volcano"],
    ),
    (
        "Geschichte",
        &["römer", "mittelalter", "weltkrieg", "revolution", "ägypt", "antike", "ritter"],
    ),
    (
        "Deutsch",
        &["grammatik", "wortart", "rechtschreibung", "gedicht", "märchen"],
    ),
    (
        "Informatik",
        &["algorithmus", "programmieren", "computer", "internet"],
    ),
];

/// Best-guess school subject for a topic.
pub fn infer_subject(topic: &str) -> Option<&'static str> {
    let topic = topic.to_lowercase();
    SUBJECT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| topic.contains(k)))
        .map(|(subject, _)| *subject)
}

fn is_missing(subject: &str) -> bool {
    let s = subject.trim();
    s.is_empty() || s.eq_ignore_ascii_case("unknown")
}

pub async fn interpret(
    runner: &StageRunner<'_>,
    request: &RequestDescriptor,
) -> Result<InterpretedBrief> {
    let fallback: Option<String> = request
        .explicit_subject()
        .map(str::to_string)
        .or_else(|| infer_subject(&request.topic).map(str::to_string));

    let prompt = PromptBuilder::new(Template::Interpreter)
        .var("topic", request.topic.trim())
        .var(
            "grade_level",
            request
                .grade_level
                .map(|g| g.to_string())
                .unwrap_or_else(|| "not specified".into()),
        )
        .var(
            "subject_hint",
            fallback
                .as_deref()
                .unwrap_or("not specified, infer it from the topic"),
        )
        .input("request", request)?
        .build();

    runner
        .run(StageName::Interpreter, prompt, |mut brief: InterpretedBrief| {
            if is_missing(&brief.subject) {
                match &fallback {
                    Some(subject) => {
                        tracing::info!(subject = %subject, "subject filled from keyword table");
                        brief.subject = subject.clone();
                    }
                    // Leave it blank so validation rejects it.
                    None => brief.subject.clear(),
                }
            }
            Ok(brief)
        })
        .await
}
