use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use common::services::{
    GeminiClient, GroqClient,
    gemini::InlineImage,
    groq::SamplingOptions,
};

use crate::{
    models::{
        artisan::Artisan,
        marketing::{
            BulkItem, BulkProductResponse, MarketingResponse, ProductDescriptionRequest,
            ProductDescriptionResponse, StoryResponse,
        },
    },
    utils::error::{ApiError, Result},
};

pub const BULK_BATCH_SIZE: usize = 5;
pub const BULK_BATCH_PAUSE: Duration = Duration::from_secs(1);
const SHORT_DESCRIPTION_CHARS: usize = 100;

const COPYWRITER_SYSTEM_PROMPT: &str = "You are an expert copywriter specializing in authentic Indian \
     handicrafts and artisan products. You create compelling, culturally-sensitive product descriptions \
     that highlight craftsmanship, tradition, and artistic value.";

pub fn marketing_prompt(prompt: &str) -> String {
    format!(
        "You are an expert marketing copywriter. \
         Given the following prompt and product image, generate a catchy, engaging, and persuasive \
         marketing statement for an artisan's handcrafted products. \
         Make it suitable for social media, highlight authenticity, uniqueness, and supporting local artisans. \
         Limit the output to a maximum of 2 lines.\n\n\
         Give only the marketing statement and do not mention anything else.\n\
         Prompt: {prompt}\n\nMarketing Statement (max 2 lines):"
    )
}

#[instrument(skip(gemini, prompt, image), fields(has_image = image.is_some()))]
pub async fn generate_marketing(
    gemini: &GeminiClient,
    artisan_id: &str,
    prompt: &str,
    image: Option<InlineImage>,
) -> Result<MarketingResponse> {
    if prompt.trim().is_empty() && image.is_none() {
        return Err(ApiError::validation("prompt", "Provide a prompt or an image"));
    }

    let output = gemini
        .generate_multimodal(&marketing_prompt(prompt.trim()), image.as_ref())
        .await?;
    let content = output
        .text
        .ok_or_else(|| ApiError::ExternalApi("Gemini returned no marketing text".to_owned()))?;

    Ok(MarketingResponse {
        status: "success".to_owned(),
        content,
        artisan_id: artisan_id.to_owned(),
    })
}

/// The artisan details block the story is rewritten from.
pub fn story_context(artisan: &Artisan, extra_info: &str) -> String {
    let name = if artisan.name.trim().is_empty() {
        "The artisan"
    } else {
        artisan.name.as_str()
    };

    let mut context = format!(
        "Name: {name}\nLocation: {}\nSkills: {}\nBio: {}\nShop Name: {}\nCreated At: {}\nUpdated At: {}\n",
        artisan.location.as_deref().unwrap_or_default(),
        artisan.skills.join(", "),
        artisan.bio.as_deref().unwrap_or_default(),
        artisan.shop_name.as_deref().unwrap_or_default(),
        artisan.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        artisan.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    if !extra_info.trim().is_empty() {
        context.push_str(&format!("Additional Info: {}\n", extra_info.trim()));
    }
    context
}

pub fn story_prompt(context: &str) -> String {
    format!(
        "You are an expert creative writer for artisan stories. \
         Given the following artisan details and extra info, write an inspiring, clear, and engaging story for customers. \
         Keep the artisan's voice and details, but improve grammar, flow, and impact.\n\n\
         Artisan details:\n{context}\n\nStory:"
    )
}

#[instrument(skip(gemini, artisan, extra_info))]
pub async fn generate_story(
    gemini: &GeminiClient,
    artisan_id: &str,
    artisan: &Artisan,
    extra_info: &str,
) -> Result<StoryResponse> {
    let context = story_context(artisan, extra_info);
    let story = gemini.generate_text(&story_prompt(&context)).await?;

    Ok(StoryResponse {
        status: "success".to_owned(),
        story,
        artisan_id: artisan_id.to_owned(),
        original_context: context,
    })
}

fn length_guide(target_length: &str) -> &'static str {
    match target_length {
        "short" => "50-100 words",
        "long" => "200-300 words",
        _ => "100-200 words",
    }
}

fn tone_guide(tone: &str) -> &'static str {
    match tone {
        "casual" => "friendly, approachable, and conversational",
        "artistic" => "creative, expressive, and emotion-evoking",
        "traditional" => "respectful of heritage, emphasizing cultural significance",
        _ => "formal, informative, and business-appropriate",
    }
}

pub fn description_prompt(request: &ProductDescriptionRequest) -> String {
    let mut lines = vec![
        format!(
            "Create a compelling product description with a {} tone.",
            tone_guide(&request.tone)
        ),
        format!("Target length: {}.", length_guide(&request.target_length)),
    ];

    if !request.keywords.is_empty() {
        lines.push(format!("Keywords to incorporate: {}", request.keywords.join(", ")));
    }
    if let Some(name) = non_blank(request.product_name.as_deref()) {
        lines.push(format!("Product name: {name}"));
    }
    if let Some(craft) = non_blank(request.craft_type.as_deref()) {
        lines.push(format!("Type of craft: {craft}"));
    }
    if let Some(location) = non_blank(request.artisan_location.as_deref()) {
        lines.push(format!(
            "Artisan location: {location} (add relevant cultural context)"
        ));
    }

    lines.extend(
        [
            "",
            "Please respond with a JSON object containing:",
            "- 'description': The full product description",
            "- 'title': A catchy product title",
            "- 'short_description': A brief 1-2 sentence summary",
            "- 'highlights': An array of key product highlights/features",
            "",
            "Focus on:",
            "- Authentic craftsmanship and traditional techniques",
            "- Cultural heritage and artistic value",
            "- Quality materials and attention to detail",
            "- Uniqueness and handmade character",
            "- Supporting local artisan communities",
            "",
            "Avoid:",
            "- Generic descriptions",
            "- Overly promotional language",
            "- Cultural stereotypes or clichés",
        ]
        .map(str::to_owned),
    );

    lines.join("\n")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn title_from_keywords(keywords: &[String]) -> String {
    if keywords.is_empty() {
        return "Handcrafted Artisan Product".to_owned();
    }
    let words: Vec<String> = keywords.iter().take(3).map(|k| capitalize(k.trim())).collect();
    format!("Handcrafted {}", words.join(" "))
}

pub fn truncate_summary(text: &str) -> String {
    if text.chars().count() > SHORT_DESCRIPTION_CHARS {
        let head: String = text.chars().take(SHORT_DESCRIPTION_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_owned()
    }
}

#[derive(Debug, Default, Deserialize)]
struct StructuredCopy {
    description: Option<String>,
    title: Option<String>,
    short_description: Option<String>,
    highlights: Option<Vec<String>>,
}

/// Models often wrap JSON in a markdown fence; peel it off before parsing.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Turns a completion into the response shape. A JSON object fills the fields
/// it carries; anything else becomes the description verbatim. Missing fields
/// fall back to values derived from the request.
pub fn parse_description_reply(
    reply: &str,
    request: &ProductDescriptionRequest,
) -> ProductDescriptionResponse {
    let raw = reply.trim();
    let structured = serde_json::from_str::<StructuredCopy>(strip_code_fence(raw)).ok();
    let copy = structured.unwrap_or_default();

    let description = non_blank(copy.description.as_deref())
        .unwrap_or(raw)
        .to_owned();
    let title = non_blank(copy.title.as_deref())
        .or_else(|| non_blank(request.product_name.as_deref()))
        .map(str::to_owned)
        .unwrap_or_else(|| title_from_keywords(&request.keywords));
    let short_description = non_blank(copy.short_description.as_deref())
        .map(str::to_owned)
        .unwrap_or_else(|| truncate_summary(&description));
    let highlights = copy
        .highlights
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| request.keywords.clone());

    ProductDescriptionResponse {
        description,
        title,
        short_description,
        highlights,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        keywords_used: request.keywords.clone(),
    }
}

pub fn validate_description_request(request: &ProductDescriptionRequest) -> Result<()> {
    if request.keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(ApiError::validation("keywords", "At least one keyword is required"));
    }
    Ok(())
}

#[instrument(skip(groq, request), fields(keywords = request.keywords.len()))]
pub async fn describe_product(
    groq: &GroqClient,
    request: &ProductDescriptionRequest,
) -> Result<ProductDescriptionResponse> {
    validate_description_request(request)?;

    let reply = groq
        .complete(
            COPYWRITER_SYSTEM_PROMPT,
            &description_prompt(request),
            SamplingOptions::default(),
        )
        .await?;

    Ok(parse_description_reply(&reply, request))
}

/// Describes every product, five at a time, pausing between batches to stay
/// under the provider's rate limits. Failures are reported per item.
#[instrument(skip(groq, products), fields(count = products.len()))]
pub async fn describe_products(
    groq: &GroqClient,
    products: &[ProductDescriptionRequest],
    pause: Duration,
) -> Result<BulkProductResponse> {
    if products.is_empty() {
        return Err(ApiError::validation("products", "At least one product is required"));
    }

    let mut results = Vec::with_capacity(products.len());
    let batches = products.chunks(BULK_BATCH_SIZE).count();

    for (batch_idx, batch) in products.chunks(BULK_BATCH_SIZE).enumerate() {
        let outcomes = join_all(batch.iter().map(|product| describe_product(groq, product))).await;

        for (offset, outcome) in outcomes.into_iter().enumerate() {
            let product_index = batch_idx * BULK_BATCH_SIZE + offset;
            match outcome {
                Ok(generated) => results.push(BulkItem::Generated(generated)),
                Err(e) => {
                    warn!(product_index, "Description generation failed: {e}");
                    results.push(BulkItem::Failed {
                        error: e.to_string(),
                        product_index,
                    });
                }
            }
        }

        if batch_idx + 1 < batches {
            tokio::time::sleep(pause).await;
        }
    }

    let success_count = results
        .iter()
        .filter(|item| matches!(item, BulkItem::Generated(_)))
        .count();
    let error_count = results.len() - success_count;
    info!(success_count, error_count, "Bulk descriptions finished");

    Ok(BulkProductResponse {
        results,
        success_count,
        error_count,
    })
}

pub fn poster_prompt(product_name: Option<&str>) -> String {
    let subject = match non_blank(product_name) {
        Some(name) => format!("the handcrafted product \"{name}\""),
        None => "this handcrafted product".to_owned(),
    };
    format!(
        "Design a minimal, neat marketing poster for {subject} using the attached photo. \
         Keep the product as the focal point on a clean, uncluttered background with soft lighting. \
         Add one short tagline about authentic Indian craftsmanship in elegant typography{}. \
         Do not add prices, logos, or any other text.",
        if non_blank(product_name).is_some() {
            " alongside the product name"
        } else {
            ""
        }
    )
}

#[instrument(skip(gemini, image), fields(mime = %image.mime_type, bytes = image.bytes.len()))]
pub async fn generate_poster(
    gemini: &GeminiClient,
    image: InlineImage,
    product_name: Option<&str>,
) -> Result<InlineImage> {
    let output = gemini
        .generate_multimodal(&poster_prompt(product_name), Some(&image))
        .await?;

    output
        .images
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::ExternalApi("Gemini returned no poster image".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use chrono::TimeZone;
    use common::{Config, ExternalApiService};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    /// Answers every completion except those whose prompt mentions `failing`.
    async fn fake_groq(failing: &'static str) -> GroqClient {
        let router = Router::new().route(
            "/chat/completions",
            post(move |Json(body): Json<Value>| async move {
                let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
                if prompt.contains(failing) {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": {"message": "prompt rejected"}})),
                    )
                } else {
                    (
                        StatusCode::OK,
                        Json(json!({"choices": [{"message": {"role": "assistant", "content": "Hand-thrown and kiln-fired."}}]})),
                    )
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let config = Config {
            groq_api_key: Some("gsk".into()),
            groq_model: "llama-test".into(),
            ..Config::default()
        };
        let http = ExternalApiService::new()
            .unwrap()
            .with_retry_policy(1, Duration::from_millis(1));
        GroqClient::new(&config, http).with_base_url(format!("http://{addr}"))
    }

    fn request(keywords: &[&str]) -> ProductDescriptionRequest {
        ProductDescriptionRequest {
            keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
            product_name: None,
            craft_type: None,
            artisan_location: None,
            target_length: "medium".into(),
            tone: "professional".into(),
        }
    }

    #[test]
    fn prompt_includes_only_provided_context() {
        let mut req = request(&["terracotta", "hand-painted"]);
        req.craft_type = Some("pottery".into());
        req.tone = "artistic".into();
        req.target_length = "short".into();

        let prompt = description_prompt(&req);
        assert!(prompt.starts_with("Create a compelling product description with a creative, expressive"));
        assert!(prompt.contains("Target length: 50-100 words."));
        assert!(prompt.contains("Keywords to incorporate: terracotta, hand-painted"));
        assert!(prompt.contains("Type of craft: pottery"));
        assert!(!prompt.contains("Product name:"));
        assert!(!prompt.contains("Artisan location:"));
    }

    #[test]
    fn unknown_tone_and_length_use_defaults() {
        let mut req = request(&["brass"]);
        req.tone = "sarcastic".into();
        req.target_length = "epic".into();
        let prompt = description_prompt(&req);
        assert!(prompt.contains("formal, informative, and business-appropriate"));
        assert!(prompt.contains("100-200 words"));
    }

    #[test]
    fn json_reply_fills_every_field() {
        let reply = r#"{"description":"A vase.","title":"Azure Vase","short_description":"Blue.","highlights":["glazed"]}"#;
        let out = parse_description_reply(reply, &request(&["blue", "pottery"]));
        assert_eq!(out.description, "A vase.");
        assert_eq!(out.title, "Azure Vase");
        assert_eq!(out.short_description, "Blue.");
        assert_eq!(out.highlights, vec!["glazed"]);
        assert_eq!(out.keywords_used, vec!["blue", "pottery"]);
    }

    #[test]
    fn fenced_json_reply_is_unwrapped() {
        let reply = "```json\n{\"description\":\"Woven by hand.\",\"title\":\"Pashmina\"}\n```";
        let out = parse_description_reply(reply, &request(&["shawl"]));
        assert_eq!(out.description, "Woven by hand.");
        assert_eq!(out.title, "Pashmina");
        assert_eq!(out.short_description, "Woven by hand.");
        assert_eq!(out.highlights, vec!["shawl"]);
    }

    #[test]
    fn plain_text_reply_uses_fallbacks() {
        let long = "x".repeat(150);
        let out = parse_description_reply(&long, &request(&["BLUE", "pottery", "jaipur", "vase"]));
        assert_eq!(out.description, long);
        assert_eq!(out.title, "Handcrafted Blue Pottery Jaipur");
        assert_eq!(out.short_description, format!("{}...", "x".repeat(100)));
        assert_eq!(out.highlights, vec!["BLUE", "pottery", "jaipur", "vase"]);
    }

    #[test]
    fn product_name_beats_keyword_title() {
        let mut req = request(&["silk"]);
        req.product_name = Some("Banarasi Saree".into());
        let out = parse_description_reply("Short text.", &req);
        assert_eq!(out.title, "Banarasi Saree");
        assert_eq!(out.short_description, "Short text.");
    }

    #[test]
    fn summary_truncation_counts_characters() {
        let text = "क".repeat(101);
        let summary = truncate_summary(&text);
        assert_eq!(summary.chars().count(), 103);
        assert_eq!(truncate_summary("exactly"), "exactly");
    }

    #[test]
    fn blank_keywords_are_rejected() {
        assert!(validate_description_request(&request(&[])).is_err());
        assert!(validate_description_request(&request(&["  "])).is_err());
        assert!(validate_description_request(&request(&["wood"])).is_ok());
    }

    #[test]
    fn story_context_lists_profile_and_extra_info() {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let artisan = Artisan {
            id: Uuid::new_v4(),
            user_id: "u-1".into(),
            name: "Meera".into(),
            email: "meera@crafts.in".into(),
            phone: None,
            location: Some("Jaipur".into()),
            bio: Some("Blue pottery since 1998".into()),
            shop_name: Some("Meera's Shop".into()),
            story: None,
            skills: vec!["Pottery".into(), "Glazing".into()],
            profile_photo: None,
            contact_email: None,
            user_type: "artisan".into(),
            created_at: created,
            updated_at: created,
        };

        let context = story_context(&artisan, " Exhibited at Dilli Haat ");
        assert_eq!(
            context,
            "Name: Meera\nLocation: Jaipur\nSkills: Pottery, Glazing\nBio: Blue pottery since 1998\n\
             Shop Name: Meera's Shop\nCreated At: 2024-01-02T03:04:05Z\nUpdated At: 2024-01-02T03:04:05Z\n\
             Additional Info: Exhibited at Dilli Haat\n"
        );
        assert!(story_prompt(&context).ends_with("Story:"));
        assert!(!story_context(&artisan, "").contains("Additional Info"));
    }

    #[test]
    fn marketing_prompt_caps_output_at_two_lines() {
        let prompt = marketing_prompt("Diwali sale on diyas");
        assert!(prompt.contains("maximum of 2 lines"));
        assert!(prompt.contains("Prompt: Diwali sale on diyas"));
    }

    #[test]
    fn poster_prompt_mentions_name_only_when_given() {
        assert!(poster_prompt(Some("Dhokra Elephant")).contains("\"Dhokra Elephant\""));
        assert!(!poster_prompt(Some("  ")).contains("product name"));
        assert!(poster_prompt(None).contains("this handcrafted product"));
    }

    #[tokio::test]
    async fn bulk_failures_keep_their_position_across_batches() {
        let groq = fake_groq("item-6").await;
        let products: Vec<ProductDescriptionRequest> = (0..7)
            .map(|i| request(&[format!("item-{i}").as_str()]))
            .collect();

        let response = describe_products(&groq, &products, Duration::ZERO).await.unwrap();

        assert_eq!(response.results.len(), 7);
        assert_eq!(response.success_count, 6);
        assert_eq!(response.error_count, 1);
        match &response.results[5] {
            BulkItem::Generated(generated) => assert_eq!(generated.keywords_used, vec!["item-5"]),
            other => panic!("expected a generated description, got {other:?}"),
        }
        assert!(matches!(
            &response.results[6],
            BulkItem::Failed { product_index: 6, .. }
        ));
    }

    #[tokio::test]
    async fn bulk_without_products_is_rejected() {
        let groq = fake_groq("never").await;
        let err = describe_products(&groq, &[], Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }
}
