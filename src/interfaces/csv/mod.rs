pub mod referrer_writer;
