// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Intent Classification
//!
//! Pure, deterministic classification of caller input into an
//! [`IntentCategory`] with a confidence score.
//!
//! ## Matching
//!
//! Input is normalised (lowercased, punctuation folded to spaces, whitespace
//! collapsed) and matched against each category's ordered [`Matcher`] list.
//! Matchers are English and Italian; a category scores on whichever language
//! the caller used.
//!
//! ## Confidence
//!
//! Matched weights are combined with a noisy-OR:
//!
//! ```text
//! confidence = min(CAP, 1 - Π (1 - wᵢ))
//! ```
//!
//! Each additional match can only raise the score, multi-word phrases and
//! regex patterns weigh more than single keywords, and `1.0` stays reserved
//! for structured direct queries ([`DirectQuery`]).
//!
//! ## Tie-break
//!
//! Candidates within `epsilon` of the best score are resolved by
//! [`IntentCategory::priority`], never by catalog or match order.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Highest confidence a classified (non-structured) request can reach.
pub const MAX_CLASSIFIED_CONFIDENCE: f64 = 0.99;
/// Confidence of a structured direct query.
pub const DIRECT_QUERY_CONFIDENCE: f64 = 1.0;

const KEYWORD: f64 = 0.35;
const DOMAIN_NOUN: f64 = 0.45;
const ARTIFACT: f64 = 0.55;
const PHRASE: f64 = 0.6;
const PATTERN: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiPattern {
    Form,
    Grid,
    Dashboard,
    Workflow,
    Report,
}

impl UiPattern {
    pub const ALL: [UiPattern; 5] = [Self::Form, Self::Grid, Self::Dashboard, Self::Workflow, Self::Report];

    pub fn name(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Grid => "grid",
            Self::Dashboard => "dashboard",
            Self::Workflow => "workflow",
            Self::Report => "report",
        }
    }
}

/// Closed set of request intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "category", content = "pattern")]
pub enum IntentCategory {
    Authentication,
    Discovery,
    Execution,
    PerformanceOptimization,
    ProcessAnalysis,
    Ui(UiPattern),
    Generic,
}

impl IntentCategory {
    /// Tie-break rank; lower wins.
    ///
    /// authentication > discovery > execution > AI enhancement > UI > generic
    pub fn priority(self) -> u8 {
        match self {
            Self::Authentication => 0,
            Self::Discovery => 1,
            Self::Execution => 2,
            Self::PerformanceOptimization => 3,
            Self::ProcessAnalysis => 4,
            Self::Ui(UiPattern::Form) => 5,
            Self::Ui(UiPattern::Grid) => 6,
            Self::Ui(UiPattern::Dashboard) => 7,
            Self::Ui(UiPattern::Workflow) => 8,
            Self::Ui(UiPattern::Report) => 9,
            Self::Generic => 10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Discovery => "discovery",
            Self::Execution => "execution",
            Self::PerformanceOptimization => "performance-optimization",
            Self::ProcessAnalysis => "process-analysis",
            Self::Ui(UiPattern::Form) => "ui-form",
            Self::Ui(UiPattern::Grid) => "ui-grid",
            Self::Ui(UiPattern::Dashboard) => "ui-dashboard",
            Self::Ui(UiPattern::Workflow) => "ui-workflow",
            Self::Ui(UiPattern::Report) => "ui-report",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercased input with punctuation folded to single spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
}

impl NormalizedText {
    pub fn new(input: &str) -> Self {
        let folded: String = input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        Self {
            text: folded.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split(' ').filter(|t| !t.is_empty())
    }

    pub fn has_token(&self, word: &str) -> bool {
        self.tokens().any(|t| t == word)
    }

    pub fn has_phrase(&self, phrase: &str) -> bool {
        format!(" {} ", self.text).contains(&format!(" {} ", phrase))
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Whole-token match.
    Keyword { word: &'static str, weight: f64 },
    /// Contiguous multi-token match.
    Phrase { phrase: &'static str, weight: f64 },
    /// Regex over the normalised text.
    Pattern { label: &'static str, regex: Regex, weight: f64 },
}

impl Matcher {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Keyword { weight, .. } | Self::Phrase { weight, .. } | Self::Pattern { weight, .. } => *weight,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Keyword { word, .. } => *word,
            Self::Phrase { phrase, .. } => *phrase,
            Self::Pattern { label, .. } => *label,
        }
    }

    pub fn matches(&self, text: &NormalizedText) -> bool {
        match self {
            Self::Keyword { word, .. } => text.has_token(word),
            Self::Phrase { phrase, .. } => text.has_phrase(phrase),
            Self::Pattern { regex, .. } => regex.is_match(text.as_str()),
        }
    }
}

/// Combine matched weights into a monotonic, capped confidence.
pub fn combine_weights<I: IntoIterator<Item = f64>>(weights: I) -> f64 {
    let miss: f64 = weights.into_iter().map(|w| 1.0 - w.clamp(0.0, 1.0)).product();
    (1.0 - miss).clamp(0.0, MAX_CLASSIFIED_CONFIDENCE)
}

/// Confidence of one category for one input, with the matchers that fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentMatch {
    pub category: IntentCategory,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IntentRule {
    pub category: IntentCategory,
    pub matchers: Vec<Matcher>,
}

impl IntentRule {
    fn evaluate(&self, text: &NormalizedText) -> Option<IntentMatch> {
        let fired: Vec<&Matcher> = self.matchers.iter().filter(|m| m.matches(text)).collect();
        if fired.is_empty() {
            return None;
        }
        Some(IntentMatch {
            category: self.category,
            confidence: combine_weights(fired.iter().map(|m| m.weight())),
            evidence: fired.iter().map(|m| m.label().to_string()).collect(),
        })
    }
}

/// Ordered intent rules.
#[derive(Debug, Clone)]
pub struct IntentCatalog {
    rules: Vec<IntentRule>,
}

impl IntentCatalog {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// Built-in English/Italian catalog for SAP business requests.
    pub fn standard() -> Result<Self, regex::Error> {
        let rules = vec![
            IntentRule {
                category: IntentCategory::Authentication,
                matchers: [
                    keywords(
                        &[
                            "login", "logout", "authenticate", "authentication", "signin", "session", "credentials",
                            "accedi", "autenticazione", "autenticati", "sessione", "credenziali",
                        ],
                        DOMAIN_NOUN,
                    ),
                    phrases(&["sign in", "log in", "log out", "auth status", "am i authenticated", "stato autenticazione"]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Discovery,
                matchers: [
                    keywords(
                        &[
                            "service", "services", "entity", "entities", "metadata", "schema", "fields", "discover",
                            "catalog", "servizio", "servizi", "entità", "entita", "metadati", "campi", "scopri",
                            "catalogo",
                        ],
                        DOMAIN_NOUN,
                    ),
                    phrases(&[
                        "what services",
                        "which services",
                        "available services",
                        "list services",
                        "search services",
                        "entity sets",
                        "quali servizi",
                        "servizi disponibili",
                        "cerca servizi",
                        "elenca servizi",
                    ]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Execution,
                matchers: [
                    keywords(
                        &[
                            "show", "list", "get", "find", "display", "give", "fetch", "count", "mostra", "mostrami",
                            "elenca", "trova", "dammi", "visualizza", "conta", "recupera",
                        ],
                        KEYWORD,
                    ),
                    keywords(
                        &[
                            "customers", "customer", "orders", "order", "sales", "invoices", "materials", "products",
                            "suppliers", "partners", "clienti", "cliente", "ordini", "ordine", "vendite", "fatture",
                            "materiali", "prodotti", "fornitori", "partner",
                        ],
                        DOMAIN_NOUN,
                    ),
                    phrases(&["how many", "quanti sono", "sales orders", "ordini di vendita", "business partners"]),
                    vec![
                        pattern(
                            "time window",
                            r"\b(last|past|ultim[ie]|scors[ie]) \d+ (days?|weeks?|months?|years?|giorni|settimane|mesi|anni)\b",
                        )?,
                        pattern("top n", r"\b(top|first|primi|prime) \d+\b")?,
                        pattern("date literal", r"\b\d{4} \d{1,2} \d{1,2}\b")?,
                    ],
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::PerformanceOptimization,
                matchers: [
                    keywords(
                        &[
                            "optimize", "optimise", "performance", "slow", "faster", "speed", "ottimizza",
                            "ottimizzare", "prestazioni", "lento", "lenta", "lente", "velocizza",
                        ],
                        DOMAIN_NOUN,
                    ),
                    phrases(&[
                        "query performance",
                        "optimize query",
                        "optimize this query",
                        "too slow",
                        "ottimizza query",
                        "ottimizza la query",
                        "troppo lenta",
                    ]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::ProcessAnalysis,
                matchers: [
                    keywords(
                        &[
                            "process", "processes", "bottleneck", "bottlenecks", "insights", "trend", "trends",
                            "analyze", "analyse", "analysis", "kpi", "processo", "processi", "analizza", "analisi",
                            "tendenze", "andamento",
                        ],
                        DOMAIN_NOUN,
                    ),
                    phrases(&[
                        "order to cash",
                        "procure to pay",
                        "process insights",
                        "business process",
                        "colli di bottiglia",
                        "processo aziendale",
                    ]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Ui(UiPattern::Form),
                matchers: [
                    keywords(&["form", "forms", "modulo", "maschera"], ARTIFACT),
                    phrases(&["input form", "create form", "edit form", "modulo di inserimento", "crea modulo"]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Ui(UiPattern::Grid),
                matchers: [
                    keywords(&["grid", "table", "spreadsheet", "griglia", "tabella"], ARTIFACT),
                    phrases(&["data grid", "editable table", "griglia dati", "tabella modificabile"]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Ui(UiPattern::Dashboard),
                matchers: [
                    keywords(&["dashboard", "dashboards", "chart", "charts", "cruscotto", "grafico", "grafici"], ARTIFACT),
                    phrases(&["kpi dashboard", "build dashboard", "crea dashboard", "crea cruscotto"]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Ui(UiPattern::Workflow),
                matchers: [
                    keywords(&["workflow", "approval", "approvals", "flusso", "approvazione"], ARTIFACT),
                    phrases(&["approval flow", "approval workflow", "flusso di approvazione", "flusso approvativo"]),
                ]
                .concat(),
            },
            IntentRule {
                category: IntentCategory::Ui(UiPattern::Report),
                matchers: [
                    keywords(&["report", "reports", "reporting", "rapporto", "resoconto"], ARTIFACT),
                    phrases(&["build report", "generate report", "genera report", "crea report"]),
                ]
                .concat(),
            },
        ];
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Every category with at least one match, best first.
    ///
    /// Equal confidences are ordered by priority so the output is stable.
    pub fn classify(&self, text: &NormalizedText) -> Vec<IntentMatch> {
        let mut matches: Vec<IntentMatch> = self.rules.iter().filter_map(|rule| rule.evaluate(text)).collect();
        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.category.priority().cmp(&b.category.priority()))
        });
        matches
    }
}

/// Pick the winning match: the best-priority candidate within `epsilon` of the best score.
pub fn select_winner(matches: &[IntentMatch], epsilon: f64) -> Option<&IntentMatch> {
    let best = matches.iter().map(|m| m.confidence).fold(f64::NEG_INFINITY, f64::max);
    if !best.is_finite() {
        return None;
    }
    matches
        .iter()
        .filter(|m| best - m.confidence <= epsilon)
        .min_by_key(|m| m.category.priority())
}

fn keywords(words: &[&'static str], weight: f64) -> Vec<Matcher> {
    words.iter().map(|&word| Matcher::Keyword { word, weight }).collect()
}

fn phrases(phrases: &[&'static str]) -> Vec<Matcher> {
    phrases
        .iter()
        .map(|&phrase| Matcher::Phrase { phrase, weight: PHRASE })
        .collect()
}

fn pattern(label: &'static str, expr: &str) -> Result<Matcher, regex::Error> {
    Ok(Matcher::Pattern {
        label,
        regex: Regex::new(expr)?,
        weight: PATTERN,
    })
}

/// Structured entity query: `[/service/path/]EntitySet[(key)]?$option=...`.
///
/// The query options are kept as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_path: Option<String>,
    pub entity_set: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub query_options: String,
}

/// Recognises [`DirectQuery`] input.
#[derive(Debug, Clone)]
pub struct DirectQueryParser {
    regex: Regex,
}

impl DirectQueryParser {
    pub fn new() -> Result<Self, regex::Error> {
        let regex = Regex::new(
            r"^(?P<path>/?(?:[A-Za-z0-9_.;=']+/)*)(?P<entity>[A-Za-z_][A-Za-z0-9_.]*)(?:\((?P<key>[^)]*)\))?\?(?P<options>\$[A-Za-z]+=.*)$",
        )?;
        Ok(Self { regex })
    }

    pub fn parse(&self, input: &str) -> Option<DirectQuery> {
        let captures = self.regex.captures(input.trim())?;
        let path = captures.name("path").map(|m| m.as_str().trim_end_matches('/')).unwrap_or("");
        Some(DirectQuery {
            service_path: (!path.is_empty()).then(|| path.to_string()),
            entity_set: captures.name("entity")?.as_str().to_string(),
            key: captures.name("key").map(|m| m.as_str().to_string()),
            query_options: captures.name("options")?.as_str().to_string(),
        })
    }
}
