pub mod conversation_store;
