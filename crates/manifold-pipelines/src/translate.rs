//! Vendor-independent request translation steps.
//!
//! Each adapter runs the same pipeline before building its payload: clear the
//! host bookkeeping fields, lift the system prompt out of the conversation,
//! check image limits, and resolve sampling parameters against its own
//! defaults.  The vendor-specific payload shapes live with the adapters.

use crate::error::{PipelineError, Result};
use crate::types::{
    ChatMessage, ContentPart, ImageSource, MessageContent, RequestOptions, Role, Sampling,
};

/// Maximum number of images accepted in a single request.
pub const MAX_IMAGES: usize = 5;

/// Maximum cumulative decoded image size accepted in a single request.
pub const MAX_IMAGE_BYTES: u64 = 100 * 1024 * 1024;

/// Tokens added on top of the thinking budget when `max_tokens` is too small.
pub const REASONING_BUFFER_TOKENS: u32 = 1000;

// ---------------------------------------------------------------------------
// Host fields
// ---------------------------------------------------------------------------

/// Clear the host bookkeeping fields so they can never reach a vendor.
pub fn strip_host_fields(options: &mut RequestOptions) {
    let had_fields =
        options.user.is_some() || options.chat_id.is_some() || options.title.is_some();
    options.user = None;
    options.chat_id = None;
    options.title = None;
    if had_fields {
        tracing::trace!("stripped host bookkeeping fields from request");
    }
}

// ---------------------------------------------------------------------------
// System message
// ---------------------------------------------------------------------------

/// Split the first system message out of the conversation.
///
/// Every system-role message is removed from the returned list; only the
/// first one's text is kept.  List content contributes its text parts.
pub fn pop_system_message(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let mut system: Option<String> = None;
    let mut rest: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role == Role::System {
            if system.is_none() {
                system = Some(msg.content.text());
            }
        } else {
            rest.push(msg);
        }
    }

    (system, rest)
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Turn a host image URL into an [`ImageSource`].
///
/// `data:image/<type>;base64,<payload>` URIs become inline base64 images;
/// anything else is passed through as a remote URL.
pub fn process_image(url: &str) -> Result<ImageSource> {
    if !url.starts_with("data:image") {
        return Ok(ImageSource::Url { url: url.to_owned() });
    }

    let (header, data) = url
        .split_once(',')
        .ok_or_else(|| PipelineError::validation("malformed image data URI: missing payload"))?;

    let media_type = header
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .unwrap_or_default();

    Ok(ImageSource::Base64 {
        media_type: media_type.to_owned(),
        data: data.to_owned(),
    })
}

/// Running tally of the images admitted into one request.
#[derive(Debug, Default)]
pub struct ImageBudget {
    count: usize,
    total_bytes: u64,
}

impl ImageBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one more image, failing once a limit is exceeded.
    ///
    /// The decoded size of inline images is estimated as 3/4 of the base64
    /// payload length; remote URLs count toward the image limit only.
    pub fn admit(&mut self, source: &ImageSource) -> Result<()> {
        let size = match source {
            ImageSource::Base64 { data, .. } => data.len() as u64 * 3 / 4,
            ImageSource::Url { .. } => 0,
        };
        self.admit_size(size)
    }

    fn admit_size(&mut self, size: u64) -> Result<()> {
        if self.count >= MAX_IMAGES {
            return Err(PipelineError::validation(format!(
                "Maximum of {MAX_IMAGES} images per API call exceeded"
            )));
        }

        self.total_bytes += size;
        if self.total_bytes > MAX_IMAGE_BYTES {
            return Err(PipelineError::validation(
                "Total size of images exceeds 100 MB limit",
            ));
        }

        self.count += 1;
        Ok(())
    }

    /// Number of images admitted so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Check the image limits across a whole conversation without rewriting it.
pub fn validate_images(messages: &[ChatMessage]) -> Result<()> {
    let mut budget = ImageBudget::new();
    for msg in messages {
        if let MessageContent::Parts(parts) = &msg.content {
            for part in parts {
                if let ContentPart::ImageUrl { image_url } = part {
                    budget.admit(&process_image(&image_url.url)?)?;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Per-vendor sampling defaults.
///
/// Optional fields set to `None` are never sent to that vendor, even when the
/// host supplies a value.
#[derive(Debug, Clone, Copy)]
pub struct SamplingDefaults {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_k: Option<u32>,
    pub top_p: Option<f64>,
    /// Whether the vendor payload carries stop sequences.
    pub stop: bool,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

impl Sampling {
    /// Fill the host's sampling options with vendor defaults.
    pub fn resolve(options: &RequestOptions, defaults: &SamplingDefaults) -> Self {
        Self {
            max_tokens: options.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: options.temperature.unwrap_or(defaults.temperature),
            top_k: defaults.top_k.map(|d| options.top_k.unwrap_or(d)),
            top_p: defaults.top_p.map(|d| options.top_p.unwrap_or(d)),
            stop: defaults
                .stop
                .then(|| options.stop.clone().unwrap_or_default()),
            presence_penalty: defaults
                .presence_penalty
                .map(|d| options.presence_penalty.unwrap_or(d)),
            frequency_penalty: defaults
                .frequency_penalty
                .map(|d| options.frequency_penalty.unwrap_or(d)),
        }
    }

    /// Apply the extended-thinking constraints.
    ///
    /// Temperature is pinned to 1.0, `top_k`/`top_p` are dropped, and
    /// `max_tokens` is raised above the budget when it does not exceed it.
    pub fn enable_reasoning(&mut self, budget_tokens: u32) {
        self.temperature = 1.0;
        self.top_k = None;
        self.top_p = None;
        if self.max_tokens <= budget_tokens {
            self.max_tokens = budget_tokens.saturating_add(REASONING_BUFFER_TOKENS);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: SamplingDefaults = SamplingDefaults {
        max_tokens: 4096,
        temperature: 0.8,
        top_k: Some(40),
        top_p: Some(0.9),
        stop: true,
        presence_penalty: None,
        frequency_penalty: None,
    };

    #[test]
    fn strip_host_fields_clears_bookkeeping() {
        let mut options = RequestOptions {
            user: Some(serde_json::json!({"id": "u1"})),
            chat_id: Some("c1".into()),
            title: Some("My chat".into()),
            ..Default::default()
        };
        strip_host_fields(&mut options);
        assert!(options.user.is_none());
        assert!(options.chat_id.is_none());
        assert!(options.title.is_none());
    }

    #[test]
    fn pop_system_message_takes_first_and_drops_rest() {
        let messages = vec![
            ChatMessage::user("before"),
            ChatMessage::system("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::system("second"),
        ];
        let (system, rest) = pop_system_message(messages);
        assert_eq!(system.as_deref(), Some("first"));
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn pop_system_message_without_system() {
        let (system, rest) = pop_system_message(vec![ChatMessage::user("hi")]);
        assert!(system.is_none());
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn data_uri_becomes_inline_image() {
        let source = process_image("data:image/png;base64,AAAA").unwrap();
        assert_eq!(
            source,
            ImageSource::Base64 {
                media_type: "image/png".into(),
                data: "AAAA".into(),
            }
        );
    }

    #[test]
    fn remote_url_passes_through() {
        let source = process_image("https://example.com/cat.jpg").unwrap();
        assert_eq!(
            source,
            ImageSource::Url {
                url: "https://example.com/cat.jpg".into()
            }
        );
    }

    #[test]
    fn data_uri_without_payload_is_rejected() {
        let err = process_image("data:image/png;base64").unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn base64_size_is_estimated_from_payload_length() {
        let mut budget = ImageBudget::new();
        let source = ImageSource::Base64 {
            media_type: "image/png".into(),
            data: "A".repeat(400),
        };
        budget.admit(&source).unwrap();
        assert_eq!(budget.total_bytes, 300);
    }

    #[test]
    fn sixth_image_is_rejected() {
        let mut budget = ImageBudget::new();
        let source = ImageSource::Url {
            url: "https://example.com/a.png".into(),
        };
        for _ in 0..MAX_IMAGES {
            budget.admit(&source).unwrap();
        }
        let err = budget.admit(&source).unwrap_err();
        assert!(err.to_string().contains("Maximum of 5 images"));
        assert_eq!(budget.count(), MAX_IMAGES);
    }

    #[test]
    fn oversized_images_are_rejected() {
        let mut budget = ImageBudget::new();
        budget.admit_size(MAX_IMAGE_BYTES / 2).unwrap();
        budget.admit_size(MAX_IMAGE_BYTES / 2).unwrap();
        let err = budget.admit_size(1).unwrap_err();
        assert!(err.to_string().contains("100 MB"));
    }

    #[test]
    fn validate_images_counts_across_messages() {
        let parts = |n: usize| {
            (0..n)
                .map(|_| ContentPart::image_url("data:image/png;base64,AAAA"))
                .collect::<Vec<_>>()
        };
        let ok = vec![ChatMessage::user_parts(parts(3)), ChatMessage::user_parts(parts(2))];
        assert!(validate_images(&ok).is_ok());

        let too_many = vec![ChatMessage::user_parts(parts(3)), ChatMessage::user_parts(parts(3))];
        assert!(matches!(
            validate_images(&too_many),
            Err(PipelineError::Validation { .. })
        ));
    }

    #[test]
    fn resolve_applies_defaults() {
        let sampling = Sampling::resolve(&RequestOptions::default(), &DEFAULTS);
        assert_eq!(sampling.max_tokens, 4096);
        assert_eq!(sampling.temperature, 0.8);
        assert_eq!(sampling.top_k, Some(40));
        assert_eq!(sampling.top_p, Some(0.9));
        assert_eq!(sampling.stop, Some(vec![]));
        assert!(sampling.presence_penalty.is_none());
    }

    #[test]
    fn resolve_prefers_host_values_and_ignores_unsupported_fields() {
        let options = RequestOptions {
            max_tokens: Some(100),
            temperature: Some(0.2),
            stop: Some(vec!["END".into()]),
            presence_penalty: Some(1.5),
            ..Default::default()
        };
        let sampling = Sampling::resolve(&options, &DEFAULTS);
        assert_eq!(sampling.max_tokens, 100);
        assert_eq!(sampling.temperature, 0.2);
        assert_eq!(sampling.stop, Some(vec!["END".to_owned()]));
        assert!(sampling.presence_penalty.is_none());
    }

    #[test]
    fn enable_reasoning_enforces_constraints() {
        let mut sampling = Sampling::resolve(&RequestOptions::default(), &DEFAULTS);
        sampling.enable_reasoning(16_000);
        assert_eq!(sampling.temperature, 1.0);
        assert!(sampling.top_k.is_none());
        assert!(sampling.top_p.is_none());
        assert_eq!(sampling.max_tokens, 17_000);
    }

    #[test]
    fn enable_reasoning_keeps_larger_max_tokens() {
        let options = RequestOptions {
            max_tokens: Some(32_000),
            ..Default::default()
        };
        let mut sampling = Sampling::resolve(&options, &DEFAULTS);
        sampling.enable_reasoning(16_000);
        assert_eq!(sampling.max_tokens, 32_000);
    }

    #[test]
    fn enable_reasoning_saturates_huge_budget() {
        let mut sampling = Sampling::resolve(&RequestOptions::default(), &DEFAULTS);
        sampling.enable_reasoning(u32::MAX - 10);
        assert_eq!(sampling.max_tokens, u32::MAX);
    }
}
