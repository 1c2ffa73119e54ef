mod common;
mod documents;
mod routing;
