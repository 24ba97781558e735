mod deployment_tests;
mod live_tests;
