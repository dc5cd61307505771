use talus_tpl::{Context, Environment, MemoryLoader};

#[cfg(test)]
mod test;

mod templates {
    talus_tpl::directory!("templates/");
    talus_tpl::file!("single/notice.html");
    //language=html
    talus_tpl::str!("hello_first_last", r#"
        <p>Hello {FIRSTNAME} {LASTNAME|upper}</p>
    "#);
}

fn environment() -> talus_tpl::Result<Environment> {
    let mut env = Environment::new(MemoryLoader::new());
    for template in [templates::layout(), templates::partials_nav(), templates::posts()] {
        env.preload(&template)?;
    }
    Ok(env)
}

fn context() -> talus_tpl::Result<Context> {
    let mut context = Context::new();
    context
        .set("FIRSTNAME", "King")
        .set("LASTNAME", "Tubby")
        .set("TITLE", "Dub & Co")
        .set("MENU", vec!["home", "posts", "about"])
        .set("COUNT", 2);
    context.block("posts", [("TITLE", "Rockers")])?;
    context.block("posts.comments", [("TEXT", "Heavy\nweight")])?;
    context.block("posts", [("TITLE", "Channel One")])?;
    Ok(context)
}

fn main() -> talus_tpl::Result<()> {
    let context = context()?;

    let html = templates::hello_first_last().render(&context)?;
    println!("{}", html);

    let html2 = templates::notice().render(&context)?;
    println!("{}", html2);

    let html3 = environment()?.render("layout.html", &context)?;
    println!("{}", html3);
    Ok(())
}
