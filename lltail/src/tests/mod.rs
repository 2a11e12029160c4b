
mod lexer_tests;
mod prediction_tests;
mod recovery_tests;
