pub mod milestone_writer;
