pub mod chat_service;
pub mod relay;

#[cfg(test)]
pub mod testing;
