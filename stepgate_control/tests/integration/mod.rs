mod fixtures;
mod pipeline;
mod properties;
