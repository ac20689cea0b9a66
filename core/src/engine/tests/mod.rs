mod helpers;
mod idle_tests;
