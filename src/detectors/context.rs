use crate::detectors::rules::{ContextRule, context_rules};
use crate::detectors::utils::{
    ADDRESS_RE, EMAIL_RE, PHONE_RE, URL_RE, any_date, bullet_items, first_time, lines,
};
use crate::detectors::{DetectContext, DetectError, Detector, VisionBackend, simulate_latency};
use crate::schema::{
    CalendarEntry, ContactCard, ContextEntity, ContextPayload, ContextType, DetectionPayload,
    DetectionResult, DetectorType, EntityType, ImagePayload, ShoppingItemDraft, ShoppingListDraft,
    SuggestedAction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static VENUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat\s+([A-Z][\w'’&-]*(?:\s+[A-Z][\w'’&-]*)*)")
        .expect("static pattern is valid")
});
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)@(\w{2,})").expect("static pattern is valid"));
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*(?:x\s+)?(.+)$|^(.+?)\s+x\s*(\d+)$").expect("static pattern is valid")
});

const EVENT_TITLES: &[(&str, &str)] = &[
    ("meet up", "Meetup"),
    ("meetup", "Meetup"),
    ("get together", "Get-together"),
    ("birthday", "Birthday"),
    ("wedding", "Wedding"),
    ("concert", "Concert"),
    ("dinner", "Dinner"),
    ("lunch", "Lunch"),
    ("party", "Party"),
    ("meeting", "Meeting"),
    ("celebration", "Celebration"),
];

const DESCRIPTION_LIMIT: usize = 280;

pub struct ContextDetector {
    vision: Arc<dyn VisionBackend>,
    latency: Duration,
    rules: Vec<ContextRule>,
}

impl ContextDetector {
    pub fn new(vision: Arc<dyn VisionBackend>, latency: Duration) -> Self {
        Self {
            vision,
            latency,
            rules: context_rules(),
        }
    }

    /// Classifies screenshot text. Contact cards are decided structurally,
    /// the rest by cue tables in precedence order.
    pub fn analyse(&self, text: &str, now: DateTime<Utc>) -> Option<(ContextPayload, f32)> {
        if text.trim().is_empty() {
            return None;
        }
        if let Some(analysis) = contact_analysis(text) {
            return Some(analysis);
        }

        let lower = text.to_lowercase();
        let rule = self.rules.iter().find(|rule| {
            let hits = rule.cue_hits(&lower);
            match rule.context_type {
                ContextType::Shopping => hits > 0 && !bullet_items(text).is_empty(),
                ContextType::Event => {
                    hits > 0 && (any_date(text, now).is_some() || first_time(text).is_some())
                }
                ContextType::Social => hits > 0 || MENTION_RE.is_match(text),
                _ => hits > 0,
            }
        })?;

        let (entities, action) = match rule.context_type {
            ContextType::Shopping => shopping_analysis(text, &lower),
            ContextType::Event => event_analysis(text, &lower, now),
            ContextType::Reminder => (temporal_entities(text, now), None),
            _ => (social_entities(text), None),
        };
        let confidence = (rule.base_confidence + entities.len() as f32 * 0.03).min(0.9);
        let payload = ContextPayload {
            context_type: rule.context_type,
            extracted_text: None,
            entities,
            suggested_action: action,
        };
        Some((payload, confidence))
    }
}

#[async_trait]
impl Detector for ContextDetector {
    fn name(&self) -> &'static str {
        "context"
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::Context
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
        let Some(text) = analysis.text.as_deref() else {
            return Ok(None);
        };
        let Some((mut payload, confidence)) = self.analyse(text, ctx.now) else {
            return Ok(None);
        };
        if ctx.options.enable_ocr {
            payload.extracted_text = Some(text.to_string());
        }
        tracing::debug!(
            context_type = payload.context_type.as_str(),
            entities = payload.entities.len(),
            "analysed context"
        );
        Ok(ctx.finish(image, DetectionPayload::Context(payload), confidence))
    }
}

fn contact_analysis(text: &str) -> Option<(ContextPayload, f32)> {
    let email = EMAIL_RE.find(text)?.as_str().to_string();
    let phone = PHONE_RE.find(text)?.as_str().to_string();

    let is_detail = |line: &str| {
        EMAIL_RE.is_match(line)
            || PHONE_RE.is_match(line)
            || ADDRESS_RE.is_match(line)
            || URL_RE.is_match(line)
    };
    let mut names = lines(text).filter(|l| !is_detail(*l));
    let name = names.next()?.to_string();
    let (title, company) = match names.next() {
        Some(line) => match line.split_once(',') {
            Some((title, company)) => (
                Some(title.trim().to_string()),
                Some(company.trim().to_string()),
            ),
            None => (None, Some(line.to_string())),
        },
        None => (None, None),
    };
    let address = ADDRESS_RE.find(text).map(|m| m.as_str().trim().to_string());

    let mut entities = vec![ContextEntity::new(EntityType::Person, &name, 0.9)];
    if let Some(company) = &company {
        entities.push(ContextEntity::new(EntityType::Organization, company, 0.8));
    }
    entities.push(ContextEntity::new(EntityType::Other, &email, 0.95));
    entities.push(ContextEntity::new(EntityType::Other, &phone, 0.9));
    if let Some(address) = &address {
        entities.push(ContextEntity::new(EntityType::Location, address, 0.8));
    }

    let card = ContactCard {
        name,
        title,
        company,
        email: Some(email),
        phone: Some(phone),
        address,
    };
    let payload = ContextPayload {
        context_type: ContextType::Contact,
        extracted_text: None,
        entities,
        suggested_action: Some(SuggestedAction::Contact(card)),
    };
    Some((payload, 0.85))
}

fn shopping_item(raw: &str) -> ShoppingItemDraft {
    let (base, notes) = match raw.split_once('(') {
        Some((name, rest)) => (
            name.trim(),
            Some(rest.trim_end_matches(')').trim().to_string()).filter(|n| !n.is_empty()),
        ),
        None => (raw.trim(), None),
    };
    let (name, quantity) = match QUANTITY_RE.captures(base) {
        Some(c) if c.get(1).is_some() => (c[2].trim().to_string(), c[1].parse().unwrap_or(1)),
        Some(c) if c.get(4).is_some() => (c[3].trim().to_string(), c[4].parse().unwrap_or(1)),
        _ => (base.to_string(), 1),
    };
    ShoppingItemDraft {
        name,
        quantity,
        notes,
    }
}

fn shopping_analysis(text: &str, lower: &str) -> (Vec<ContextEntity>, Option<SuggestedAction>) {
    let items: Vec<ShoppingItemDraft> = bullet_items(text).iter().map(|i| shopping_item(i)).collect();
    let entities = items
        .iter()
        .map(|item| ContextEntity::new(EntityType::Product, &item.name, 0.85))
        .collect();
    let list_name = if lower.contains("shopping list") {
        "Shopping List"
    } else {
        "Grocery List"
    };
    let action = SuggestedAction::AddToShoppingList(ShoppingListDraft {
        items,
        list_name: list_name.to_string(),
    });
    (entities, Some(action))
}

fn temporal_entities(text: &str, now: DateTime<Utc>) -> Vec<ContextEntity> {
    let mut entities = Vec::new();
    if let Some(date) = any_date(text, now) {
        entities.push(ContextEntity::new(
            EntityType::Date,
            date.format("%Y-%m-%d").to_string(),
            0.8,
        ));
    }
    if let Some(time) = first_time(text) {
        entities.push(ContextEntity::new(EntityType::Date, time, 0.75));
    }
    entities
}

fn event_analysis(
    text: &str,
    lower: &str,
    now: DateTime<Utc>,
) -> (Vec<ContextEntity>, Option<SuggestedAction>) {
    let mut entities = temporal_entities(text, now);
    let venue = VENUE_RE
        .captures(text)
        .map(|c| c[1].trim_end_matches(['.', ',']).to_string());
    let address = ADDRESS_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string());
    let location = match (&venue, &address) {
        (Some(venue), Some(address)) => Some(format!("{venue}, {address}")),
        (venue, address) => venue.clone().or_else(|| address.clone()),
    };
    if let Some(location) = &location {
        entities.push(ContextEntity::new(EntityType::Location, location, 0.8));
    }

    let kind = EVENT_TITLES
        .iter()
        .find(|(cue, _)| lower.contains(cue))
        .map_or("Event", |(_, title)| *title);
    let title = match &venue {
        Some(venue) => format!("{kind} at {venue}"),
        None => kind.to_string(),
    };
    let description: String = text.trim().chars().take(DESCRIPTION_LIMIT).collect();

    let action = SuggestedAction::AddToCalendar(CalendarEntry {
        title,
        location,
        date: any_date(text, now),
        time: first_time(text),
        description,
    });
    (entities, Some(action))
}

fn social_entities(text: &str) -> Vec<ContextEntity> {
    MENTION_RE
        .captures_iter(text)
        .map(|c| ContextEntity::new(EntityType::Person, format!("@{}", &c[1]), 0.7))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_utils::{
        CONTACT_TEXT, EVENT_TEXT, SHOPPING_TEXT, context, fixed_now, instant_vision,
    };
    use crate::schema::DetectionOptions;
    use chrono::NaiveDate;

    fn detector() -> ContextDetector {
        ContextDetector::new(instant_vision(), Duration::ZERO)
    }

    #[test]
    fn event_text_suggests_calendar_entry() {
        let (payload, _) = detector().analyse(EVENT_TEXT, fixed_now()).unwrap();
        assert_eq!(payload.context_type, ContextType::Event);
        let Some(SuggestedAction::AddToCalendar(entry)) = payload.suggested_action else {
            panic!("expected calendar action");
        };
        assert_eq!(entry.title, "Meetup at Café Milano");
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 4, 5));
        assert_eq!(entry.time.as_deref(), Some("19:00"));
        assert_eq!(
            entry.location.as_deref(),
            Some("Café Milano, 456 Main St")
        );
    }

    #[test]
    fn shopping_text_suggests_list() {
        let (payload, confidence) = detector().analyse(SHOPPING_TEXT, fixed_now()).unwrap();
        assert_eq!(payload.context_type, ContextType::Shopping);
        let Some(SuggestedAction::AddToShoppingList(list)) = payload.suggested_action else {
            panic!("expected shopping list action");
        };
        assert_eq!(list.list_name, "Grocery List");
        let names: Vec<_> = list.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Bread", "Eggs", "Apples", "Laundry detergent"]);
        assert_eq!(list.items[2].notes.as_deref(), Some("dozen"));
        assert_eq!(payload.entities.len(), 5);
        assert!(confidence <= 0.9);
    }

    #[test]
    fn quantities_are_parsed() {
        assert_eq!(shopping_item("2 lemons").quantity, 2);
        assert_eq!(shopping_item("2 lemons").name, "lemons");
        assert_eq!(shopping_item("Limes x3").quantity, 3);
        assert_eq!(shopping_item("Limes x3").name, "Limes");
        assert_eq!(shopping_item("Basil").quantity, 1);
    }

    #[test]
    fn contact_card_is_structural() {
        let (payload, _) = detector().analyse(CONTACT_TEXT, fixed_now()).unwrap();
        assert_eq!(payload.context_type, ContextType::Contact);
        let Some(SuggestedAction::Contact(card)) = payload.suggested_action else {
            panic!("expected contact action");
        };
        assert_eq!(card.name, "John Smith");
        assert_eq!(card.title.as_deref(), Some("CEO"));
        assert_eq!(card.company.as_deref(), Some("Acme Inc."));
        assert_eq!(card.phone.as_deref(), Some("(555) 123-4567"));
    }

    #[test]
    fn reminder_has_no_action() {
        let (payload, _) = detector()
            .analyse("Reminder: dentist appointment tomorrow", fixed_now())
            .unwrap();
        assert_eq!(payload.context_type, ContextType::Reminder);
        assert!(payload.suggested_action.is_none());
        assert_eq!(payload.entities[0].value, "2025-04-04");
    }

    #[test]
    fn social_mentions_become_people() {
        let (payload, _) = detector()
            .analyse("@maria liked your photo", fixed_now())
            .unwrap();
        assert_eq!(payload.context_type, ContextType::Social);
        assert_eq!(payload.entities[0].value, "@maria");
    }

    #[test]
    fn plain_text_has_no_context() {
        assert!(detector().analyse("The quick brown fox", fixed_now()).is_none());
        assert!(detector().analyse("", fixed_now()).is_none());
    }

    #[tokio::test]
    async fn extracted_text_follows_ocr_flag() {
        let image = ImagePayload::from(SHOPPING_TEXT);
        let result = detector()
            .detect(&image, &context(DetectionOptions::new().with_ocr(false)))
            .await
            .unwrap()
            .unwrap();
        assert!(result.as_context().unwrap().extracted_text.is_none());
    }
}
