mod api_test;
mod helpers;
mod scheduler_test;
