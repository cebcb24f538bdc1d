// src/prompt.rs
//! Language-specific prompt construction for short review generation.
//!
//! Every language carries the same rule set (1–2 sentences, no lists/emoji/hashtags, one
//! concrete sensory detail, no stock phrases, length window) and five style "flavors" that
//! the `variant` request field rotates through.

use serde::{Deserialize, Serialize};

use crate::llm::ChatPrompt;

pub const MIN_CHARS_FLOOR: u32 = 40;
pub const DEFAULT_MIN_CHARS: u32 = 80;
pub const DEFAULT_MAX_CHARS: u32 = 180;
pub const MIN_SPAN: u32 = 10;

/// Steering snippets are cut so a long previous text doesn't dominate the prompt.
const STEER_SNIPPET_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "zh-TW")]
    ZhTw,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "ko")]
    Ko,
    #[serde(rename = "fr")]
    Fr,
    #[serde(rename = "es")]
    Es,
}

impl Language {
    /// Lenient: accepts `zh`, `zh-tw`, `cn`, `en-US`, `ja_JP`, … Unknown → default.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };
        let lower = s.to_ascii_lowercase().replace('_', "-");
        let primary = lower.split('-').next().unwrap_or("");
        match primary {
            "zh" | "cn" | "tw" => Language::ZhTw,
            "en" => Language::En,
            "ja" | "jp" => Language::Ja,
            "ko" | "kr" => Language::Ko,
            "fr" => Language::Fr,
            "es" => Language::Es,
            _ => Language::default(),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::ZhTw => "zh-TW",
            Language::En => "en",
            Language::Ja => "ja",
            Language::Ko => "ko",
            Language::Fr => "fr",
            Language::Es => "es",
        }
    }

    /// Column suffix used by the store sheet (`top3En`, `consJa`, …).
    pub fn sheet_suffix(self) -> &'static str {
        match self {
            Language::ZhTw => "Cn",
            Language::En => "En",
            Language::Ja => "Ja",
            Language::Ko => "Ko",
            Language::Fr => "Fr",
            Language::Es => "Es",
        }
    }

    fn text(self) -> &'static LocaleText {
        match self {
            Language::ZhTw => &ZH_TW,
            Language::En => &EN,
            Language::Ja => &JA,
            Language::Ko => &KO,
            Language::Fr => &FR,
            Language::Es => &ES,
        }
    }
}

struct LocaleText {
    system: &'static [&'static str],
    flavors: [&'static str; 5],
    store_name: &'static str,
    store_id: &'static str,
    tags: &'static str,
    none: &'static str,
    cons: &'static str,
    flavor: &'static str,
    length: &'static str,
    separator: &'static str,
    /// Between a label and its value.
    colon: &'static str,
    output_only: &'static str,
    steer: &'static str,
}

static ZH_TW: LocaleText = LocaleText {
    system: &[
        "你是專業在地向導，專長是把顧客體驗濃縮成『自然、可信、短小精悍的繁體中文評論』。",
        "輸出限制：只寫 1–2 句，避免列點、避免 emoji、避免 hashtag、避免誇飾用語濫用與多個驚嘆號。",
        "要點：加入一個具體感官細節（口感、香氣、溫度、份量、動線等）或小情境（點餐、上桌、座位、排隊）。",
        "請避免千篇一律的句型（例如「讓我忍不住…」「真的很…」「超級…」等口頭禪）。",
        "若有「可改進之處」，請用溫和、具建設性的語氣帶過，不要攻擊店家。",
        "若有指定長度上下限，盡可能控制在該字數範圍內（以中文字數估計即可）。",
    ],
    flavors: [
        "語氣自然親切、像在對朋友分享。",
        "語氣精簡俐落、重點清楚、不拖泥帶水。",
        "語氣溫暖帶感官，微微描寫香氣或口感。",
        "語氣中性理性，避免過度主觀形容。",
        "加入一個細小具體情境（如排隊、店內座位、端上桌瞬間）。",
    ],
    store_name: "店名",
    store_id: "店家代號",
    tags: "重點標籤",
    none: "無",
    cons: "可改進之處",
    flavor: "風格變體要求",
    length: "長度要求：{min}–{max} 字（繁體中文）。",
    separator: "、",
    colon: "：",
    output_only: "請輸出最終短評文字本身，不要前後加任何說明。",
    steer: "這段文字和先前的評論太像了：「{prev}」。請換一個開頭、不同的句型與不同的細節重新寫。",
};

static EN: LocaleText = LocaleText {
    system: &[
        "You are a local guide who condenses customer experiences into natural, believable, short English reviews.",
        "Write 1–2 sentences only. No bullet points, no emoji, no hashtags, no hype words, at most one exclamation mark.",
        "Include one concrete sensory detail (texture, aroma, temperature, portion, flow) or a small scene (ordering, the dish arriving, seating, the queue).",
        "Avoid formulaic openers such as \"I couldn't help but…\", \"Absolutely amazing…\", \"Super…\".",
        "If there are points to improve, mention them once in a gentle, constructive tone.",
        "Stay within the requested character range as closely as you can.",
    ],
    flavors: [
        "Sound natural and friendly, like telling a friend.",
        "Be concise and to the point.",
        "Be warm and sensory; hint at aroma or texture.",
        "Be neutral and matter-of-fact; avoid strong opinions.",
        "Add one small, specific moment (waiting in line, the seat, the dish arriving).",
    ],
    store_name: "Store name",
    store_id: "Store code",
    tags: "Highlights",
    none: "none",
    cons: "Could be better",
    flavor: "Style",
    length: "Length: {min}–{max} characters.",
    separator: ", ",
    colon: ": ",
    output_only: "Output only the review text, with no preface or explanation.",
    steer: "That draft is too close to an earlier review: \"{prev}\". Rewrite with a different opening, sentence shape and detail.",
};

static JA: LocaleText = LocaleText {
    system: &[
        "あなたは地元に詳しいガイドです。お客様の体験を、自然で信頼できる短い日本語の口コミにまとめます。",
        "1〜2文のみ。箇条書き・絵文字・ハッシュタグ・大げさな表現・連続した感嘆符は避けてください。",
        "食感・香り・温度・量などの具体的な五感の描写、または注文・配膳・席・行列などの小さな場面を一つ入れてください。",
        "「思わず…」「本当に…」「超…」のような決まり文句は避けてください。",
        "改善点がある場合は、穏やかで建設的な言い方で一言だけ触れてください。",
        "指定された文字数の範囲にできるだけ収めてください。",
    ],
    flavors: [
        "友人に話すような、自然で親しみやすい口調。",
        "簡潔で要点がはっきりした口調。",
        "温かみがあり、香りや食感を少し描写する口調。",
        "中立的で落ち着いた口調、主観的な形容は控えめに。",
        "行列・席・料理が運ばれてきた瞬間など、小さな具体的場面を一つ入れる。",
    ],
    store_name: "店名",
    store_id: "店舗コード",
    tags: "ポイント",
    none: "なし",
    cons: "改善点",
    flavor: "スタイル",
    length: "文字数：{min}〜{max}文字。",
    separator: "、",
    colon: "：",
    output_only: "口コミ本文のみを出力し、前置きや説明は付けないでください。",
    steer: "この文章は以前の口コミ「{prev}」に似すぎています。書き出し・文の形・細部を変えて書き直してください。",
};

static KO: LocaleText = LocaleText {
    system: &[
        "당신은 지역 가이드로서 고객 경험을 자연스럽고 믿을 만한 짧은 한국어 리뷰로 요약합니다.",
        "1~2문장만 작성하세요. 목록, 이모지, 해시태그, 과장된 표현, 여러 개의 느낌표는 피하세요.",
        "식감, 향, 온도, 양 같은 구체적인 감각 묘사나 주문, 음식이 나오는 순간, 자리, 줄 서기 같은 작은 장면을 하나 넣으세요.",
        "\"참을 수 없었다…\", \"진짜 너무…\", \"완전…\" 같은 상투적인 표현은 피하세요.",
        "아쉬운 점이 있다면 부드럽고 건설적인 어조로 한 번만 언급하세요.",
        "요청된 글자 수 범위를 최대한 지키세요.",
    ],
    flavors: [
        "친구에게 이야기하듯 자연스럽고 친근한 어조.",
        "간결하고 핵심이 분명한 어조.",
        "따뜻하고 감각적인 어조로 향이나 식감을 살짝 묘사.",
        "중립적이고 차분한 어조, 주관적 수식은 자제.",
        "줄 서기, 좌석, 음식이 나오는 순간 같은 작은 구체적 장면을 하나 추가.",
    ],
    store_name: "가게 이름",
    store_id: "가게 코드",
    tags: "포인트",
    none: "없음",
    cons: "아쉬운 점",
    flavor: "스타일",
    length: "길이: {min}~{max}자.",
    separator: ", ",
    colon: ": ",
    output_only: "리뷰 본문만 출력하고 앞뒤 설명은 붙이지 마세요.",
    steer: "이 초안은 이전 리뷰 \"{prev}\"와 너무 비슷합니다. 시작, 문장 구조, 디테일을 바꿔 다시 써 주세요.",
};

static FR: LocaleText = LocaleText {
    system: &[
        "Vous êtes un guide local qui résume l'expérience d'un client en un avis court, naturel et crédible, en français.",
        "Une à deux phrases seulement. Pas de listes, pas d'emoji, pas de hashtags, pas de superlatifs à outrance ni de points d'exclamation en série.",
        "Ajoutez un détail sensoriel concret (texture, arôme, température, portion) ou une petite scène (la commande, l'arrivée du plat, la place, la file d'attente).",
        "Évitez les tournures toutes faites comme « Je n'ai pas pu résister… », « Vraiment trop… », « Super… ».",
        "S'il y a des points à améliorer, mentionnez-les une fois, sur un ton doux et constructif.",
        "Respectez au mieux la fourchette de caractères demandée.",
    ],
    flavors: [
        "Ton naturel et chaleureux, comme à un ami.",
        "Ton concis, droit au but.",
        "Ton chaleureux et sensoriel, évoquez un arôme ou une texture.",
        "Ton neutre et factuel, sans adjectifs trop subjectifs.",
        "Ajoutez un petit moment précis (la file, la place, l'arrivée du plat).",
    ],
    store_name: "Nom de l'établissement",
    store_id: "Code",
    tags: "Points forts",
    none: "aucun",
    cons: "À améliorer",
    flavor: "Style",
    length: "Longueur : {min}–{max} caractères.",
    separator: ", ",
    colon: ": ",
    output_only: "Répondez uniquement avec le texte de l'avis, sans introduction ni explication.",
    steer: "Ce brouillon ressemble trop à un avis précédent : « {prev} ». Réécrivez avec une autre ouverture, une autre structure et un autre détail.",
};

static ES: LocaleText = LocaleText {
    system: &[
        "Eres un guía local que resume la experiencia de un cliente en una reseña breve, natural y creíble en español.",
        "Escribe solo 1–2 frases. Sin listas, sin emojis, sin hashtags, sin exageraciones ni varios signos de exclamación.",
        "Incluye un detalle sensorial concreto (textura, aroma, temperatura, porción) o una pequeña escena (el pedido, la llegada del plato, la mesa, la fila).",
        "Evita frases hechas como «No pude resistirme…», «Súper…», «De verdad que…».",
        "Si hay aspectos a mejorar, menciónalos una vez con un tono amable y constructivo.",
        "Ajústate lo más posible al rango de caracteres indicado.",
    ],
    flavors: [
        "Tono natural y cercano, como contándoselo a un amigo.",
        "Tono conciso y directo.",
        "Tono cálido y sensorial; sugiere un aroma o una textura.",
        "Tono neutral y objetivo, sin adjetivos demasiado subjetivos.",
        "Añade un pequeño momento concreto (la fila, el asiento, cuando llega el plato).",
    ],
    store_name: "Nombre del local",
    store_id: "Código",
    tags: "Puntos destacados",
    none: "ninguno",
    cons: "A mejorar",
    flavor: "Estilo",
    length: "Longitud: {min}–{max} caracteres.",
    separator: ", ",
    colon: ": ",
    output_only: "Devuelve solo el texto de la reseña, sin introducción ni explicación.",
    steer: "Este borrador se parece demasiado a una reseña anterior: «{prev}». Reescríbelo con otro comienzo, otra estructura y otro detalle.",
};

/// Requested length window after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LengthBounds {
    pub min: u32,
    pub max: u32,
}

impl LengthBounds {
    /// `min = max(40, min or 80)`, `max = max(min + 10, max or 180)`; zero counts as absent.
    pub fn from_request(min: Option<i64>, max: Option<i64>) -> Self {
        let min = min
            .filter(|v| *v != 0)
            .unwrap_or(DEFAULT_MIN_CHARS as i64)
            .clamp(MIN_CHARS_FLOOR as i64, u32::MAX as i64 / 2) as u32;
        let max_floor = min + MIN_SPAN;
        let max = max
            .filter(|v| *v != 0)
            .unwrap_or(DEFAULT_MAX_CHARS as i64)
            .clamp(max_floor as i64, u32::MAX as i64) as u32;
        Self { min, max }
    }
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self::from_request(None, None)
    }
}

pub fn flavor_for(language: Language, variant: i64) -> &'static str {
    let flavors = &language.text().flavors;
    let idx = (variant.unsigned_abs() % flavors.len() as u64) as usize;
    flavors[idx]
}

#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub language: Language,
    pub store_name: &'a str,
    pub store_id: &'a str,
    pub positive_tags: &'a [String],
    pub negative_tags: &'a [String],
    pub variant: i64,
    pub length: LengthBounds,
}

pub fn build_prompt(input: &PromptInput<'_>) -> ChatPrompt {
    let t = input.language.text();

    let system = t.system.join("\n");

    let tags_line = if input.positive_tags.is_empty() {
        format!("{}{}{}", t.tags, t.colon, t.none)
    } else {
        format!("{}{}{}", t.tags, t.colon, input.positive_tags.join(t.separator))
    };

    let mut user = vec![
        format!("{}{}{}", t.store_name, t.colon, input.store_name),
        format!("{}{}{}", t.store_id, t.colon, input.store_id),
        tags_line,
    ];
    if !input.negative_tags.is_empty() {
        user.push(format!(
            "{}{}{}",
            t.cons,
            t.colon,
            input.negative_tags.join(t.separator)
        ));
    }
    user.push(format!(
        "{}{}{}",
        t.flavor,
        t.colon,
        flavor_for(input.language, input.variant)
    ));
    user.push(
        t.length
            .replace("{min}", &input.length.min.to_string())
            .replace("{max}", &input.length.max.to_string()),
    );
    user.push(t.output_only.to_string());

    ChatPrompt {
        system,
        user: user.join("\n"),
    }
}

/// Extra user line asking for a rewrite that does not resemble `previous`.
pub fn steering_hint(language: Language, previous: &str) -> String {
    let snippet: String = previous.chars().take(STEER_SNIPPET_CHARS).collect();
    let snippet = if previous.chars().count() > STEER_SNIPPET_CHARS {
        format!("{snippet}…")
    } else {
        snippet
    };
    language.text().steer.replace("{prev}", &snippet)
}

/// Same prompt with the steering hint appended to the user message.
pub fn with_steering(base: &ChatPrompt, hint: &str) -> ChatPrompt {
    ChatPrompt {
        system: base.system.clone(),
        user: format!("{}\n{}", base.user, hint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn language_parse_is_lenient() {
        assert_eq!(Language::parse(None), Language::ZhTw);
        assert_eq!(Language::parse(Some("  ")), Language::ZhTw);
        assert_eq!(Language::parse(Some("zh-tw")), Language::ZhTw);
        assert_eq!(Language::parse(Some("en-US")), Language::En);
        assert_eq!(Language::parse(Some("ja_JP")), Language::Ja);
        assert_eq!(Language::parse(Some("KO")), Language::Ko);
        assert_eq!(Language::parse(Some("de")), Language::ZhTw);
        assert_eq!(Language::Es.sheet_suffix(), "Es");
    }

    #[test]
    fn length_bounds_follow_floor_and_span() {
        assert_eq!(
            LengthBounds::from_request(None, None),
            LengthBounds { min: 80, max: 180 }
        );
        assert_eq!(
            LengthBounds::from_request(Some(10), Some(20)),
            LengthBounds { min: 40, max: 50 }
        );
        assert_eq!(
            LengthBounds::from_request(Some(0), Some(0)),
            LengthBounds { min: 80, max: 180 }
        );
        assert_eq!(
            LengthBounds::from_request(Some(120), Some(100)),
            LengthBounds { min: 120, max: 130 }
        );
        assert_eq!(
            LengthBounds::from_request(Some(-5), None),
            LengthBounds { min: 40, max: 180 }
        );
    }

    #[test]
    fn flavor_rotates_with_abs_variant() {
        assert_eq!(flavor_for(Language::ZhTw, 0), flavor_for(Language::ZhTw, 5));
        assert_eq!(flavor_for(Language::En, -1), flavor_for(Language::En, 1));
        assert_ne!(flavor_for(Language::En, 1), flavor_for(Language::En, 2));
    }

    #[test]
    fn zh_prompt_lists_tags_and_length() {
        let pos = tags(&["牛肉麵", "服務親切"]);
        let neg = tags(&["等候較久"]);
        let p = build_prompt(&PromptInput {
            language: Language::ZhTw,
            store_name: "老王牛肉麵",
            store_id: "wang01",
            positive_tags: &pos,
            negative_tags: &neg,
            variant: 2,
            length: LengthBounds::default(),
        });
        assert!(p.system.contains("繁體中文評論"));
        assert!(p.user.contains("店名：老王牛肉麵"));
        assert!(p.user.contains("重點標籤：牛肉麵、服務親切"));
        assert!(p.user.contains("可改進之處：等候較久"));
        assert!(p.user.contains("80–180 字"));
        assert!(p.user.contains(flavor_for(Language::ZhTw, 2)));
    }

    #[test]
    fn en_prompt_without_tags_says_none_and_skips_cons() {
        let p = build_prompt(&PromptInput {
            language: Language::En,
            store_name: "Blue Door Cafe",
            store_id: "blue",
            positive_tags: &[],
            negative_tags: &[],
            variant: 0,
            length: LengthBounds { min: 60, max: 120 },
        });
        assert!(p.user.contains("Highlights: none"));
        assert!(!p.user.contains("Could be better"));
        assert!(p.user.contains("60–120 characters"));
        assert!(!p.user.contains('：'));
    }

    #[test]
    fn user_values_keep_their_own_colons() {
        let pos = tags(&["Set A：noodles"]);
        let p = build_prompt(&PromptInput {
            language: Language::En,
            store_name: "Café：Bar",
            store_id: "cafe",
            positive_tags: &pos,
            negative_tags: &[],
            variant: 0,
            length: LengthBounds::default(),
        });
        assert!(p.user.contains("Store name: Café：Bar"));
        assert!(p.user.contains("Highlights: Set A：noodles"));
    }

    #[test]
    fn steering_truncates_long_previous_text() {
        let long = "很".repeat(200);
        let hint = steering_hint(Language::ZhTw, &long);
        assert!(hint.contains('…'));
        assert!(hint.chars().count() < 200);

        let base = ChatPrompt {
            system: "s".into(),
            user: "u".into(),
        };
        let steered = with_steering(&base, &hint);
        assert!(steered.user.starts_with("u\n"));
        assert_eq!(steered.system, "s");
    }
}
