pub mod broadcaster;
pub mod cleanup_task;
pub mod control_seat;
pub mod game_clock;
pub mod handlers;
pub mod messages;
pub mod mode_controller;
pub mod pull;
pub mod server_config;
pub mod spectator_channel;
pub mod web_server;
pub mod ws_handler;
