//! The two SEO conversations: keyword sets → recommendation, and recommendation +
//! site excerpts → verdict.

use tracing::info;

use crate::AppResult;
use crate::ai::prompt::PromptTemplate;
use crate::ai::{ChatMessage, ChatModel};

static SEO_KEYWORDS_PROMPT: PromptTemplate =
    PromptTemplate::new(include_str!("prompts/seo_keywords.txt"));
static CHECK_RECOMMENDATION_PROMPT: PromptTemplate =
    PromptTemplate::new(include_str!("prompts/check_recommendation.txt"));

const SEO_KEYWORDS_QUESTION: &str = "What do these keywords for the top search results for this \
    search tell me about optimizing my site for the same search?";
const CHECK_RECOMMENDATION_QUESTION: &str =
    "Does my website meet the conditions you detailed in your SEO recommendations?";

fn json_list(items: &[String]) -> AppResult<String> {
    Ok(serde_json::to_string(items)?)
}

pub fn seo_keywords_messages(search: &str, keywords: &[String]) -> AppResult<Vec<ChatMessage>> {
    let keywords = json_list(keywords)?;
    Ok(vec![
        ChatMessage::system(
            SEO_KEYWORDS_PROMPT.render(&[("search", search), ("keywords", &keywords)]),
        ),
        ChatMessage::user(SEO_KEYWORDS_QUESTION),
    ])
}

pub fn check_recommendation_messages(
    search: &str,
    recommendation: &str,
    excerpts: &[String],
) -> AppResult<Vec<ChatMessage>> {
    let excerpts = json_list(excerpts)?;
    Ok(vec![
        ChatMessage::system(CHECK_RECOMMENDATION_PROMPT.render(&[
            ("search", search),
            ("recommendation", recommendation),
            ("excerpts", &excerpts),
        ])),
        ChatMessage::user(CHECK_RECOMMENDATION_QUESTION),
    ])
}

/// Ask the model what one set of cluster keywords means for ranking on `search`.
#[tracing::instrument(name = "Asking for SEO recommendations", level = "info", skip(model, keywords))]
pub async fn make_seo_recommendations<M: ChatModel + ?Sized>(
    model: &M,
    search: &str,
    keywords: &[String],
) -> AppResult<String> {
    let messages = seo_keywords_messages(search, keywords)?;
    let answer = model.complete(&messages).await?;
    info!("Received a recommendation ({} chars)", answer.len());
    Ok(answer)
}

/// Ask the model whether the site excerpts satisfy `recommendation`.
#[tracing::instrument(
    name = "Checking the site against a recommendation",
    level = "info",
    skip(model, recommendation, excerpts)
)]
pub async fn check_seo_recommendation<M: ChatModel + ?Sized>(
    model: &M,
    search: &str,
    recommendation: &str,
    excerpts: &[String],
) -> AppResult<String> {
    let messages = check_recommendation_messages(search, recommendation, excerpts)?;
    model.complete(&messages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Role;
    use crate::ai::testing::RecordingModel;

    #[test]
    fn prompt_files_use_expected_placeholders() {
        assert_eq!(SEO_KEYWORDS_PROMPT.placeholders(), vec!["search", "keywords"]);
        assert_eq!(
            CHECK_RECOMMENDATION_PROMPT.placeholders(),
            vec!["search", "recommendation", "excerpts"]
        );
    }

    #[test]
    fn keyword_messages_embed_search_and_keywords() {
        let keywords = vec!["Schedule Service Now".to_string(), "Book \"today\"".to_string()];
        let messages = seo_keywords_messages("emergency plumber", &keywords).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Search: emergency plumber\n"));
        assert!(messages[0]
            .content
            .contains(r#"Keywords: ["Schedule Service Now","Book \"today\""]"#));
        assert!(!messages[0].content.contains("{{"));
        assert_eq!(messages[1], ChatMessage::user(SEO_KEYWORDS_QUESTION));
    }

    #[test]
    fn check_messages_embed_excerpts() {
        let excerpts = vec!["We fix pipes 24/7".to_string()];
        let messages =
            check_recommendation_messages("plumber", "Offer a booking link", &excerpts).unwrap();
        assert!(messages[0].content.contains("Recommendation: Offer a booking link"));
        assert!(messages[0].content.contains(r#"["We fix pipes 24/7"]"#));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, CHECK_RECOMMENDATION_QUESTION);
    }

    #[test]
    fn recommendation_text_is_not_treated_as_a_placeholder() {
        let excerpts = vec!["We fix pipes".to_string()];
        let messages =
            check_recommendation_messages("plumber", "Quote {{excerpts}} verbatim", &excerpts)
                .unwrap();
        assert!(messages[0].content.contains("Recommendation: Quote {{excerpts}} verbatim"));
        assert_eq!(messages[0].content.matches(r#"["We fix pipes"]"#).count(), 1);
    }

    #[tokio::test]
    async fn recommendations_come_from_the_model() {
        let model = RecordingModel::default();
        let answer = make_seo_recommendations(&model, "shoes", &["Free shipping".to_string()])
            .await
            .unwrap();
        assert_eq!(answer, "reply #2");
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0][0].content.contains("Free shipping"));
    }

    #[tokio::test]
    async fn check_propagates_model_errors() {
        let model = RecordingModel {
            fail_on: Some("broken".to_string()),
            ..Default::default()
        };
        let result = check_seo_recommendation(&model, "s", "broken", &[]).await;
        assert!(result.is_err());
    }
}
