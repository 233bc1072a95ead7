use crate::detectors::rules::{DocumentRule, INVITATION_TERMS, document_rules};
use crate::detectors::utils::{
    ADDRESS_RE, AMOUNT_RE, EMAIL_RE, PHONE_RE, any_date, bullet_items, count_terms, first_time,
    labelled_amount, labelled_value, lines, long_date, numbered_items, parse_amount, word_count,
};
use crate::detectors::{
    DetectContext, DetectError, Detector, ImageAnalysis, VisionBackend, confidence,
    simulate_latency,
};
use crate::schema::{
    DetectionPayload, DetectionResult, DetectorType, DocumentPayload, DocumentType, ImagePayload,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid")
}

static SERVINGS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:serves|servings:?|yield:?|makes)\s*(\d+)"));
static HOSTS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"([A-Z][a-z]+)\s*(?:&|and)\s*([A-Z][a-z]+)'s"));
static HOSTED_BY_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)hosted by\s+([^\n]+)"));
static CITY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Z][A-Za-z .]+,\s*[A-Z]{2}\s+\d{5}"));
static TERMS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:within|net)\s+(\d+)(?:\s+days)?"));
static DEAR_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)^dear\s+(.+?),?$"));
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bsize:?\s*(XXS|XS|S|M|L|XL|XXL|\d{1,2})\b"));
static MATERIAL_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(\d{1,3})%\s*([A-Za-z]+)"));
static FLIGHT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b([A-Z]{2}\s?\d{2,4})\b"));
static ROUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b([A-Z]{3})\s*(?:→|->|to)\s*([A-Z]{3})\b"));
static EXERCISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)^(?:[-•*]\s*)?([A-Za-z][A-Za-z -]+?)\s*[:-]?\s*(\d+)\s*(?:x|sets? of)\s*(\d+)")
});
static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(\d+)\s*(?:min|mins|minutes)\b"));

const EVENT_KINDS: &[&str] = &[
    "wedding",
    "birthday",
    "anniversary",
    "graduation",
    "baby shower",
    "conference",
    "concert",
    "reception",
    "festival",
    "party",
    "celebration",
];

const RESUME_SECTIONS: &[&str] = &[
    "summary",
    "objective",
    "experience",
    "work experience",
    "education",
    "skills",
    "projects",
    "certifications",
    "references",
];

const TOTAL_LABELS: &[&str] = &[
    "subtotal",
    "sub-total",
    "tax",
    "total",
    "amount due",
    "balance",
    "change",
    "cash",
    "tip",
];

pub struct DocumentDetector {
    vision: Arc<dyn VisionBackend>,
    latency: Duration,
    rules: Vec<DocumentRule>,
}

/// Outcome of the classification stage, before metadata extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub document_type: DocumentType,
    pub confidence: f32,
}

impl DocumentDetector {
    pub fn new(vision: Arc<dyn VisionBackend>, latency: Duration) -> Self {
        Self {
            vision,
            latency,
            rules: document_rules(),
        }
    }

    /// Classifies text and visual features. `None` when there is neither
    /// enough text nor any visual feature to go on.
    pub fn classify(&self, text: &str, features: &[String]) -> Option<Classification> {
        let lower = text.to_lowercase();
        let matched = self.rules.iter().find(|r| r.matches(&lower, features));

        let (document_type, base, feature_hits) = match matched {
            Some(rule) => {
                let document_type = if rule.document_type == DocumentType::Event
                    && count_terms(&lower, INVITATION_TERMS) > 0
                {
                    DocumentType::Invitation
                } else {
                    rule.document_type
                };
                (document_type, 0.7, rule.feature_hits(features))
            }
            None if word_count(text) >= 3 => (DocumentType::Document, 0.6, 0),
            None if !features.is_empty() => (DocumentType::Unknown, confidence::MIN_DOCUMENT, 0),
            None => return None,
        };

        let length = text.chars().count();
        let mut score = base;
        if length > 200 {
            score += 0.05;
        }
        if length > 500 {
            score += 0.05;
        }
        score += (feature_hits as f32 * 0.05).min(0.2);

        Some(Classification {
            document_type,
            confidence: score.clamp(confidence::MIN_DOCUMENT, confidence::MAX_DOCUMENT),
        })
    }

    fn analyse(
        &self,
        analysis: &ImageAnalysis,
        ctx: &DetectContext,
    ) -> Option<(DocumentPayload, f32)> {
        let text = analysis.text.as_deref().unwrap_or_default();
        let classification = self.classify(text, &analysis.visual_features)?;
        let metadata = extract_metadata(
            classification.document_type,
            text,
            &analysis.visual_features,
            ctx.now,
        );
        let extracted_text =
            (ctx.options.enable_ocr && !text.trim().is_empty()).then(|| text.to_string());
        let payload = DocumentPayload {
            document_type: classification.document_type,
            extracted_text,
            metadata,
        };
        Some((payload, classification.confidence))
    }
}

#[async_trait]
impl Detector for DocumentDetector {
    fn name(&self) -> &'static str {
        "document"
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::Document
    }

    async fn detect(
        &self,
        image: &ImagePayload,
        ctx: &DetectContext,
    ) -> Result<Option<DetectionResult>, DetectError> {
        simulate_latency(self.latency).await;
        let analysis = self
            .vision
            .analyze(image, ctx.options.language.as_deref())
            .await?;
        if analysis.is_blank() {
            return Ok(None);
        }

        let Some((payload, confidence)) = self.analyse(&analysis, ctx) else {
            return Ok(None);
        };
        tracing::debug!(
            document_type = payload.document_type.as_str(),
            confidence,
            "classified document"
        );
        Ok(ctx.finish(image, DetectionPayload::Document(payload), confidence))
    }
}

fn iso(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Inserts only the values that were found.
fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn title_case(line: &str) -> String {
    line.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Priced lines that are not totals, as (label, amount).
fn priced_items(text: &str) -> Vec<(String, f64)> {
    lines(text)
        .filter(|line| {
            let lower = line.to_lowercase();
            !TOTAL_LABELS.iter().any(|l| lower.starts_with(l))
        })
        .filter_map(|line| {
            let m = AMOUNT_RE.captures(line)?;
            let amount = parse_amount(&m[1])?;
            let label = line[..m.get(0)?.start()].trim().trim_end_matches(':').trim();
            (!label.is_empty()).then(|| (label.to_string(), amount))
        })
        .collect()
}

/// Type-specific metadata. Keys are camelCase; absent facts are omitted.
pub fn extract_metadata(
    document_type: DocumentType,
    text: &str,
    features: &[String],
    now: DateTime<Utc>,
) -> Map<String, Value> {
    match document_type {
        DocumentType::Recipe => recipe_metadata(text),
        DocumentType::Event | DocumentType::Invitation => event_metadata(text, now),
        DocumentType::Invoice => invoice_metadata(text, now),
        DocumentType::Receipt => receipt_metadata(text, now),
        DocumentType::Resume => resume_metadata(text),
        DocumentType::Letter => letter_metadata(text, now),
        DocumentType::Clothing => clothing_metadata(text),
        DocumentType::Travel => travel_metadata(text, now),
        DocumentType::Fitness => fitness_metadata(text),
        DocumentType::Document => into_map(json!({
            "wordCount": word_count(text),
            "lineCount": lines(text).count(),
            "dateDetected": iso(now.date_naive()),
        })),
        DocumentType::Unknown => into_map(json!({ "visualFeatures": features })),
    }
}

fn recipe_metadata(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let title = lines(text).find(|line| {
        let lower = line.to_lowercase();
        !lower.contains(':') && !lower.starts_with("serves") && !line.starts_with(['-', '•', '*'])
    });
    insert_some(&mut map, "title", title.map(|t| json!(t)));
    map.insert("ingredients".into(), json!(bullet_items(text)));
    let steps = numbered_items(text);
    if !steps.is_empty() {
        map.insert("instructions".into(), json!(steps));
    }
    insert_some(&mut map, "prepTime", labelled_value(text, &["prep time"]).map(Value::from));
    insert_some(
        &mut map,
        "cookTime",
        labelled_value(text, &["cook time", "cooking time"]).map(Value::from),
    );
    insert_some(
        &mut map,
        "servings",
        SERVINGS_RE
            .captures(text)
            .and_then(|c| c[1].parse::<u32>().ok())
            .map(Value::from),
    );
    map
}

fn event_location(text: &str) -> Option<String> {
    let all: Vec<&str> = lines(text).collect();
    let index = all.iter().position(|line| ADDRESS_RE.is_match(line))?;
    let mut parts = Vec::new();
    if let Some(previous) = index.checked_sub(1).map(|i| all[i])
        && !previous.chars().any(|c| c.is_ascii_digit())
        && previous.chars().next().is_some_and(char::is_uppercase)
        && first_time(previous).is_none()
    {
        parts.push(previous);
    }
    parts.push(all[index]);
    if let Some(next) = all.get(index + 1)
        && CITY_LINE_RE.is_match(next)
    {
        parts.push(next);
    }
    Some(parts.join(", "))
}

fn event_metadata(text: &str, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    let lower = text.to_lowercase();
    let kind = EVENT_KINDS
        .iter()
        .find(|k| lower.contains(*k))
        .map(|k| title_case(k));
    insert_some(&mut map, "eventType", kind.map(Value::from));

    let hosts: Vec<String> = if let Some(c) = HOSTS_RE.captures(text) {
        vec![c[1].to_string(), c[2].to_string()]
    } else if let Some(c) = HOSTED_BY_RE.captures(text) {
        c[1].split([',', '&'])
            .flat_map(|part| part.split(" and "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    } else {
        Vec::new()
    };
    if !hosts.is_empty() {
        map.insert("hosts".into(), json!(hosts));
    }

    // The RSVP line carries its own date; keep it out of the event date.
    let (rsvp_lines, body_lines): (Vec<&str>, Vec<&str>) =
        lines(text).partition(|l| l.to_lowercase().contains("rsvp"));
    let body = body_lines.join("\n");
    insert_some(&mut map, "date", any_date(&body, now).map(iso));
    insert_some(&mut map, "time", first_time(&body).map(Value::from));
    insert_some(&mut map, "location", event_location(text).map(Value::from));
    insert_some(
        &mut map,
        "rsvpDeadline",
        rsvp_lines
            .iter()
            .find_map(|l| long_date(l, now.date_naive()))
            .map(iso),
    );
    insert_some(
        &mut map,
        "contactEmail",
        EMAIL_RE.find(text).map(|m| Value::from(m.as_str())),
    );
    map
}

fn invoice_metadata(text: &str, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    insert_some(
        &mut map,
        "invoiceNumber",
        labelled_value(text, &["invoice number", "invoice no", "invoice #", "invoice"])
            .map(Value::from),
    );
    insert_some(&mut map, "date", any_date(text, now).map(iso));
    insert_some(&mut map, "vendor", labelled_value(text, &["from"]).map(Value::from));
    insert_some(
        &mut map,
        "client",
        labelled_value(text, &["bill to", "to"]).map(Value::from),
    );
    let items: Vec<Value> = priced_items(text)
        .into_iter()
        .filter(|(label, _)| !label.to_lowercase().starts_with("total"))
        .map(|(description, amount)| json!({ "description": description, "amount": amount }))
        .collect();
    map.insert("items".into(), Value::Array(items));
    insert_some(
        &mut map,
        "total",
        labelled_amount(text, &["total due", "amount due", "balance due", "total"]).map(Value::from),
    );
    insert_some(
        &mut map,
        "paymentTerms",
        TERMS_RE
            .captures(text)
            .map(|c| Value::from(format!("{} days", &c[1]))),
    );
    map
}

fn receipt_metadata(text: &str, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    insert_some(
        &mut map,
        "vendor",
        lines(text).next().map(|l| Value::from(title_case(l))),
    );
    insert_some(&mut map, "date", any_date(text, now).map(iso));
    insert_some(&mut map, "time", first_time(text).map(Value::from));
    let items: Vec<Value> = priced_items(text)
        .into_iter()
        .map(|(name, price)| json!({ "name": name, "price": price }))
        .collect();
    map.insert("items".into(), Value::Array(items));
    insert_some(&mut map, "subtotal", labelled_amount(text, &["subtotal", "sub-total"]).map(Value::from));
    insert_some(&mut map, "tax", labelled_amount(text, &["tax"]).map(Value::from));
    insert_some(&mut map, "total", labelled_amount(text, &["total"]).map(Value::from));
    map
}

fn resume_metadata(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    insert_some(&mut map, "name", lines(text).next().map(Value::from));
    insert_some(&mut map, "email", EMAIL_RE.find(text).map(|m| Value::from(m.as_str())));
    insert_some(&mut map, "phone", PHONE_RE.find(text).map(|m| Value::from(m.as_str())));
    let sections: Vec<String> = lines(text)
        .filter(|line| {
            let heading = line.trim_end_matches(':').to_lowercase();
            RESUME_SECTIONS.contains(&heading.as_str())
        })
        .map(|line| line.trim_end_matches(':').to_string())
        .collect();
    map.insert("sections".into(), json!(sections));
    map
}

fn letter_metadata(text: &str, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    let all: Vec<&str> = lines(text).collect();
    insert_some(
        &mut map,
        "recipient",
        all.iter()
            .find_map(|l| DEAR_RE.captures(l).map(|c| c[1].trim().to_string()))
            .map(Value::from),
    );
    let closing = all.iter().position(|l| {
        let lower = l.to_lowercase();
        ["sincerely", "regards", "yours truly", "best", "cheers"]
            .iter()
            .any(|c| lower.starts_with(c))
    });
    let sender = closing.and_then(|i| {
        // "Sincerely, Ann" on one line or the name on the next.
        let line = all[i];
        match line.split_once(',') {
            Some((_, name)) if !name.trim().is_empty() => Some(name.trim().to_string()),
            _ => all.get(i + 1).map(|s| s.to_string()),
        }
    });
    insert_some(&mut map, "sender", sender.map(Value::from));
    insert_some(&mut map, "date", any_date(text, now).map(iso));
    map
}

fn clothing_metadata(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let sizes: Vec<String> = SIZE_RE
        .captures_iter(text)
        .map(|c| c[1].to_uppercase())
        .collect();
    map.insert("sizes".into(), json!(sizes));
    let materials: Vec<String> = MATERIAL_RE
        .captures_iter(text)
        .map(|c| format!("{}% {}", &c[1], title_case(&c[2])))
        .collect();
    map.insert("materials".into(), json!(materials));
    let care: Vec<&str> = lines(text)
        .filter(|l| {
            let lower = l.to_lowercase();
            ["wash", "dry", "iron", "bleach"].iter().any(|w| lower.contains(w))
        })
        .collect();
    map.insert("careInstructions".into(), json!(care));
    map
}

fn travel_metadata(text: &str, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    let flights: Vec<String> = FLIGHT_RE
        .captures_iter(text)
        .map(|c| c[1].replace(' ', ""))
        .collect();
    map.insert("flightNumbers".into(), json!(flights));
    if let Some(route) = ROUTE_RE.captures(text) {
        map.insert("origin".into(), Value::from(&route[1]));
        map.insert("destination".into(), Value::from(&route[2]));
    }
    insert_some(&mut map, "date", any_date(text, now).map(iso));
    insert_some(&mut map, "departureTime", first_time(text).map(Value::from));
    insert_some(&mut map, "gate", labelled_value(text, &["gate"]).map(Value::from));
    insert_some(&mut map, "seat", labelled_value(text, &["seat"]).map(Value::from));
    insert_some(
        &mut map,
        "passenger",
        labelled_value(text, &["passenger", "name"]).map(Value::from),
    );
    map
}

fn fitness_metadata(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let exercises: Vec<Value> = lines(text)
        .filter_map(|l| EXERCISE_RE.captures(l))
        .filter_map(|c| {
            let sets: u32 = c[2].parse().ok()?;
            let reps: u32 = c[3].parse().ok()?;
            Some(json!({ "name": c[1].trim(), "sets": sets, "reps": reps }))
        })
        .collect();
    map.insert("exercises".into(), Value::Array(exercises));
    insert_some(
        &mut map,
        "durationMinutes",
        MINUTES_RE
            .captures(text)
            .and_then(|c| c[1].parse::<u32>().ok())
            .map(Value::from),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_utils::{RECEIPT_TEXT, context, fixed_now, instant_vision};
    use crate::schema::DetectionOptions;

    fn detector() -> DocumentDetector {
        DocumentDetector::new(instant_vision(), Duration::ZERO)
    }

    #[test]
    fn classifies_by_keywords_in_precedence_order() {
        let d = detector();
        let recipe = "Ingredients:\n- 2 cups flour\n- 1 tsp salt\nBake for 20 minutes";
        assert_eq!(
            d.classify(recipe, &[]).unwrap().document_type,
            DocumentType::Recipe
        );
        let invoice = "INVOICE\nBill To: XYZ\nTotal Due: $5.00";
        assert_eq!(
            d.classify(invoice, &[]).unwrap().document_type,
            DocumentType::Invoice
        );
        let letter = "Dear Ann,\nThank you for the lovely gift.\nSincerely,\nBob";
        assert_eq!(
            d.classify(letter, &[]).unwrap().document_type,
            DocumentType::Letter
        );
    }

    #[test]
    fn event_with_rsvp_is_an_invitation() {
        let d = detector();
        let party = "Birthday party at the venue, join us!";
        assert_eq!(d.classify(party, &[]).unwrap().document_type, DocumentType::Event);
        let invite = "You're invited to our wedding. RSVP soon.";
        assert_eq!(
            d.classify(invite, &[]).unwrap().document_type,
            DocumentType::Invitation
        );
    }

    #[test]
    fn features_alone_can_decide_type() {
        let d = detector();
        let features = vec!["boarding_pass".to_string()];
        let classification = d.classify("", &features).unwrap();
        assert_eq!(classification.document_type, DocumentType::Travel);
        assert!((classification.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn generic_and_unknown_fallbacks() {
        let d = detector();
        let generic = d.classify("Meeting notes from the planning session", &[]).unwrap();
        assert_eq!(generic.document_type, DocumentType::Document);
        assert!((generic.confidence - 0.6).abs() < 1e-6);

        let unknown = d.classify("", &["sparkles".to_string()]).unwrap();
        assert_eq!(unknown.document_type, DocumentType::Unknown);
        assert!((unknown.confidence - 0.5).abs() < 1e-6);

        assert!(d.classify("hi", &[]).is_none());
    }

    #[test]
    fn confidence_grows_with_length_and_features() {
        let d = detector();
        let long_letter = format!("Dear Ann,\n{}\nSincerely,\nBob", "word ".repeat(120));
        let features = vec!["letterhead_signature".to_string()];
        let classification = d.classify(&long_letter, &features).unwrap();
        // 0.7 base, +0.05 past 200 chars, +0.05 past 500, +0.05 for one feature
        assert!((classification.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn confidence_is_capped() {
        let d = detector();
        let features: Vec<String> = ["food_image", "recipe_card"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let text = format!("recipe ingredients tbsp {}", "x ".repeat(400));
        let classification = d.classify(&text, &features).unwrap();
        assert!(classification.confidence <= confidence::MAX_DOCUMENT);
    }

    #[test]
    fn receipt_metadata_extracts_totals_and_items() {
        let meta = extract_metadata(DocumentType::Receipt, RECEIPT_TEXT, &[], fixed_now());
        assert_eq!(meta["vendor"], "Grocery Store");
        assert_eq!(meta["date"], "2025-04-03");
        assert_eq!(meta["time"], "14:35");
        assert_eq!(meta["items"].as_array().unwrap().len(), 3);
        assert_eq!(meta["items"][0]["name"], "Apples");
        assert_eq!(meta["subtotal"], 11.48);
        assert_eq!(meta["tax"], 0.92);
        assert_eq!(meta["total"], 12.4);
    }

    #[test]
    fn invoice_metadata_extracts_parties_and_terms() {
        let text = "INVOICE\nInvoice #: INV-2025-04-123\nDate: April 3, 2025\n\nFrom: ABC Services Inc.\nTo: XYZ Corporation\n\nConsulting (10 hrs)    $1,500.00\nMaterials              $350.00\n\nTotal Due: $1,850.00\n\nPayment due within 30 days.";
        let meta = extract_metadata(DocumentType::Invoice, text, &[], fixed_now());
        assert_eq!(meta["invoiceNumber"], "INV-2025-04-123");
        assert_eq!(meta["date"], "2025-04-03");
        assert_eq!(meta["vendor"], "ABC Services Inc.");
        assert_eq!(meta["client"], "XYZ Corporation");
        assert_eq!(meta["items"][0]["description"], "Consulting (10 hrs)");
        assert_eq!(meta["items"][1]["amount"], 350.0);
        assert_eq!(meta["total"], 1850.0);
        assert_eq!(meta["paymentTerms"], "30 days");
    }

    #[test]
    fn recipe_metadata_extracts_ingredients() {
        let text = "Classic Pancakes\nPrep time: 10 minutes\nServes 4\nIngredients:\n- 1 cup flour\n- 1 egg\n1. Mix\n2. Cook";
        let meta = extract_metadata(DocumentType::Recipe, text, &[], fixed_now());
        assert_eq!(meta["title"], "Classic Pancakes");
        assert_eq!(meta["ingredients"], json!(["1 cup flour", "1 egg"]));
        assert_eq!(meta["instructions"], json!(["Mix", "Cook"]));
        assert_eq!(meta["prepTime"], "10 minutes");
        assert_eq!(meta["servings"], 4);
    }

    #[test]
    fn letter_metadata_finds_parties() {
        let text = "Dear Ann,\nThank you.\nSincerely,\nBob";
        let meta = extract_metadata(DocumentType::Letter, text, &[], fixed_now());
        assert_eq!(meta["recipient"], "Ann");
        assert_eq!(meta["sender"], "Bob");
    }

    #[tokio::test]
    async fn omits_text_when_ocr_disabled() {
        let image = ImagePayload::from(RECEIPT_TEXT);
        let with_ocr = detector()
            .detect(&image, &context(DetectionOptions::new()))
            .await
            .unwrap()
            .unwrap();
        assert!(with_ocr.as_document().unwrap().extracted_text.is_some());

        let without_ocr = detector()
            .detect(&image, &context(DetectionOptions::new().with_ocr(false)))
            .await
            .unwrap()
            .unwrap();
        let document = without_ocr.as_document().unwrap();
        assert_eq!(document.document_type, DocumentType::Receipt);
        assert!(document.extracted_text.is_none());
    }

    #[tokio::test]
    async fn blank_image_yields_nothing() {
        let image = ImagePayload::from("   ");
        let result = detector()
            .detect(&image, &context(DetectionOptions::new()))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
