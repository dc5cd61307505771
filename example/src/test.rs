#[cfg(test)]
mod tests {
    use talus_tpl::{Context, Error};

    use crate::{context, environment, templates};

    #[test]
    fn basic_usage() {
        mod template {
            talus_tpl::str!("test", r#"<p>{FIRSTNAME} {LASTNAME}</p>"#);
        }
        let mut context = Context::new();
        context.set("FIRSTNAME", " King").set("LASTNAME", "Tubby ");
        assert_eq!(template::test().render(&context).unwrap(), "<p> King Tubby </p>");
    }

    #[test]
    fn template_names() {
        assert_eq!(templates::layout().name, "layout.html");
        assert_eq!(templates::partials_nav().name, "partials/nav.html");
        assert_eq!(templates::notice().name, "notice.html");
        assert_eq!(templates::hello_first_last().name, "hello_first_last");
    }

    #[test]
    fn inline_template() {
        let html = templates::hello_first_last().render(&context().unwrap()).unwrap();
        assert_eq!(html.trim(), "<p>Hello King TUBBY</p>");
    }

    #[test]
    fn single_file() {
        let mut context = Context::new();
        for (count, expected) in [(3, "3 new posts"), (1, "one new post"), (0, "no new posts")] {
            context.set("COUNT", count);
            assert_eq!(
                templates::notice().render(&context).unwrap().trim(),
                format!("<p class=\"notice\">{}</p>", expected)
            );
        }
    }

    #[test]
    fn directory_with_inclusions() {
        let html = environment().unwrap().render("layout.html", &context().unwrap()).unwrap();
        assert!(html.contains("<title>Dub &amp; Co</title>"));
        assert!(!html.contains("navigation marks"));
        assert!(html.contains("<nav>Home | <b>Posts</b> | About</nav>"));
        assert!(html.contains("<h2>1/2 Rockers</h2>"));
        assert!(html.contains("<p>Heavy<br />\nweight</p>"));
        assert!(html.contains("<h2>2/2 Channel One</h2>"));
        assert!(html.contains("<p>No comments</p>"));
        assert!(!html.contains("Nothing yet"));
    }

    #[test]
    fn empty_blocks() {
        let html = environment().unwrap().render("posts.html", &Context::new()).unwrap();
        assert_eq!(html.trim(), "<p>Nothing yet</p>");
    }

    #[test]
    fn missing_partial() {
        let mut env = environment().unwrap();
        let broken = talus_tpl::Precompiled {
            name: "broken.html",
            json: "{",
        };
        assert!(env.preload(&broken).is_err());
        assert!(matches!(
            env.render("partials/footer.html", &Context::new()),
            Err(Error::MissingTemplate(_))
        ));
    }
}
