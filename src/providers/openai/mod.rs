mod api;

pub(crate) use api::ChatCompletionRequest;
