pub mod sys_main;
