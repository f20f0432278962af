pub mod bot;
pub mod config;
pub mod openai;
pub mod search;

#[cfg(test)]
mod test_server;
