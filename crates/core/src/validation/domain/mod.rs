pub mod validation_result;
pub mod validator;
