pub mod threaded_map_executor;
