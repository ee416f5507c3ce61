/// Scheduling keywords in English, French and Spanish, lowercase.
pub const SCHEDULING_KEYWORDS: &[&str] = &[
    "appointment",
    "schedule",
    "book",
    "doctor",
    "dentist",
    "medical",
    "rendez-vous",
    "réserver",
    "docteur",
    "dentiste",
    "médical",
    "cita",
    "programar",
    "médico",
    "dentista",
];

/// Cheap high-recall gate in front of extraction: case-insensitive substring match.
pub fn has_scheduling_intent(content: &str) -> bool {
    let lower = content.to_lowercase();
    SCHEDULING_KEYWORDS.iter().any(|k| lower.contains(k))
}
