use crate::detectors::utils::count_terms;
use crate::schema::{ContextType, DocumentType};
use serde::{Deserialize, Serialize};

/// Declarative classification rule for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRule {
    pub document_type: DocumentType,
    /// Lowercase terms matched on word boundaries.
    pub keywords: Vec<String>,
    /// Keyword hits needed before the text alone decides the type.
    pub min_hits: usize,
    /// Visual feature tags that indicate this type on their own.
    #[serde(default)]
    pub features: Vec<String>,
}

impl DocumentRule {
    fn new(
        document_type: DocumentType,
        keywords: &[&str],
        min_hits: usize,
        features: &[&str],
    ) -> Self {
        Self {
            document_type,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            min_hits,
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn keyword_hits(&self, lower_text: &str) -> usize {
        let keywords: Vec<&str> = self.keywords.iter().map(String::as_str).collect();
        count_terms(lower_text, &keywords)
    }

    pub fn feature_hits(&self, features: &[String]) -> usize {
        features
            .iter()
            .filter(|f| self.features.contains(f))
            .count()
    }

    pub fn matches(&self, lower_text: &str, features: &[String]) -> bool {
        self.keyword_hits(lower_text) >= self.min_hits || self.feature_hits(features) > 0
    }
}

/// Document rules in precedence order. The first matching rule wins.
pub fn document_rules() -> Vec<DocumentRule> {
    vec![
        DocumentRule::new(
            DocumentType::Recipe,
            &[
                "recipe", "ingredients", "instructions", "tbsp", "tsp", "cup", "cups",
                "preheat", "bake", "simmer", "whisk", "serves", "servings", "prep time",
                "cook time",
            ],
            3,
            &["food_image", "recipe_card"],
        ),
        DocumentRule::new(
            DocumentType::Clothing,
            &[
                "size", "cotton", "polyester", "wool", "machine wash", "tumble dry",
                "fabric", "made in", "sleeve", "fit",
            ],
            2,
            &["garment_tag", "fabric_texture"],
        ),
        DocumentRule::new(
            DocumentType::Travel,
            &[
                "flight", "boarding", "gate", "departure", "arrival", "passenger",
                "itinerary", "seat", "terminal", "check-in", "hotel", "reservation",
            ],
            2,
            &["boarding_pass", "airline_logo"],
        ),
        DocumentRule::new(
            DocumentType::Fitness,
            &[
                "workout", "reps", "sets", "exercise", "cardio", "squats", "push-ups",
                "lunges", "plank", "warm up", "cool down", "calories burned",
            ],
            2,
            &["exercise_chart"],
        ),
        DocumentRule::new(
            DocumentType::Event,
            &[
                "event", "invited", "invitation", "rsvp", "celebration", "wedding",
                "party", "venue", "ceremony", "reception", "join us", "festival",
            ],
            2,
            &["decorative_border", "script_font"],
        ),
        DocumentRule::new(
            DocumentType::Invoice,
            &[
                "invoice", "bill to", "total due", "amount due", "payment due",
                "due date", "payment terms",
            ],
            2,
            &["letterhead"],
        ),
        DocumentRule::new(
            DocumentType::Receipt,
            &[
                "receipt", "subtotal", "total", "tax", "cash", "change", "visa",
                "thank you for shopping", "qty",
            ],
            2,
            &["thermal_paper"],
        ),
        DocumentRule::new(
            DocumentType::Resume,
            &[
                "resume", "curriculum vitae", "experience", "education", "skills",
                "references", "objective", "employment",
            ],
            3,
            &[],
        ),
        DocumentRule::new(
            DocumentType::Letter,
            &["dear", "sincerely", "regards", "yours truly", "to whom it may concern"],
            2,
            &["letterhead_signature"],
        ),
    ]
}

/// Terms that turn an event document into an invitation.
pub const INVITATION_TERMS: &[&str] = &["rsvp", "invited", "invitation", "you're invited"];

/// Declarative cue set for one screenshot context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRule {
    pub context_type: ContextType,
    pub cues: Vec<String>,
    pub base_confidence: f32,
}

impl ContextRule {
    fn new(context_type: ContextType, cues: &[&str], base_confidence: f32) -> Self {
        Self {
            context_type,
            cues: cues.iter().map(|c| c.to_string()).collect(),
            base_confidence,
        }
    }

    pub fn cue_hits(&self, lower_text: &str) -> usize {
        let cues: Vec<&str> = self.cues.iter().map(String::as_str).collect();
        count_terms(lower_text, &cues)
    }
}

/// Cue tables for the cue-driven contexts. Contact is decided structurally
/// (email plus phone) before these are consulted.
pub fn context_rules() -> Vec<ContextRule> {
    vec![
        ContextRule::new(
            ContextType::Shopping,
            &[
                "pick up", "shopping list", "grocery list", "buy", "groceries",
                "need to get", "grab",
            ],
            0.75,
        ),
        ContextRule::new(
            ContextType::Event,
            &[
                "meet up", "meetup", "party", "dinner", "lunch", "meeting", "event",
                "wedding", "celebration", "concert", "birthday", "join us", "get together",
            ],
            0.65,
        ),
        ContextRule::new(
            ContextType::Reminder,
            &[
                "remind", "reminder", "don't forget", "remember to", "due", "deadline",
                "appointment",
            ],
            0.6,
        ),
        ContextRule::new(
            ContextType::Social,
            &[
                "liked", "likes", "comment", "comments", "followers", "shared",
                "retweet", "replied", "posted", "tagged",
            ],
            0.55,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_rules_follow_precedence() {
        let order: Vec<_> = document_rules().iter().map(|r| r.document_type).collect();
        assert_eq!(
            order,
            vec![
                DocumentType::Recipe,
                DocumentType::Clothing,
                DocumentType::Travel,
                DocumentType::Fitness,
                DocumentType::Event,
                DocumentType::Invoice,
                DocumentType::Receipt,
                DocumentType::Resume,
                DocumentType::Letter,
            ]
        );
    }

    #[test]
    fn keyword_threshold_or_feature_matches() {
        let rules = document_rules();
        let receipt = rules
            .iter()
            .find(|r| r.document_type == DocumentType::Receipt)
            .unwrap();

        assert!(receipt.matches("subtotal 5 tax 1 total 6", &[]));
        assert!(!receipt.matches("total 6", &[]));
        assert!(receipt.matches("", &["thermal_paper".to_string()]));
    }

    #[test]
    fn keywords_are_lowercase() {
        for rule in document_rules() {
            for keyword in &rule.keywords {
                assert_eq!(keyword, &keyword.to_lowercase());
            }
        }
        for rule in context_rules() {
            for cue in &rule.cues {
                assert_eq!(cue, &cue.to_lowercase());
            }
        }
    }

    #[test]
    fn rules_serialize_for_inspection() {
        let json = serde_json::to_value(document_rules()).unwrap();
        assert_eq!(json[0]["document_type"], "recipe");
    }
}
