pub mod openai_chat_service;
