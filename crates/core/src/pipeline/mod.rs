pub mod extract_action_items_use_case;
pub mod infrastructure;
pub mod map_executor;
pub mod pipeline_logger;
