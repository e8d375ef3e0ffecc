/// Adds a `with_base_url` builder to a client wrapping a `GeminiHttpClient` in `http`.
macro_rules! impl_with_gemini_base_url {
    ($client:ty) => {
        impl $client {
            pub fn with_base_url(mut self, base_url: String) -> Self {
                self.http = self.http.with_base_url(base_url);
                self
            }
        }
    };
}

pub(crate) use impl_with_gemini_base_url;

pub mod client;
pub mod files;
pub mod generate;
pub mod types;
pub mod video;

pub use client::GeminiHttpClient;
pub use files::GeminiFileClient;
pub use generate::GeminiGenerationClient;
pub use video::GeminiVideoClient;

#[cfg(test)]
pub(crate) mod test_support {
    use wiremock::matchers::{method, path_regex};
    use wiremock::MockBuilder;

    pub const GENERATE_CONTENT_PATH_REGEX: &str = r"^/v1beta/models/[^/]+:generateContent$";

    pub fn post_path_regex(regex: &str) -> MockBuilder {
        wiremock::Mock::given(method("POST")).and(path_regex(regex))
    }
}
