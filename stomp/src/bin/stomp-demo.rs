//! Bind the process arguments to a small set of options and print them.

use stomp::Args;
use stomp_derive::Args;

#[derive(Args, Debug)]
struct DemoArgs {
    #[stomp(long = "your", short = "f", default = "")]
    firstword: String,
    secondword: String,
    #[stomp(long = "--num", short = "-n")]
    num: i64,
    #[stomp(long = "--bool", short = "-b", default = true)]
    bool: bool,
}

fn main() {
    let args = match DemoArgs::from_command_line() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("stomp-demo: {err}");
            std::process::exit(1);
        }
    };
    println!("{} {}", args.firstword, args.secondword);
    println!("You can also do numbers: {}", args.num);
    println!("And booleans: {}", args.bool);
}
